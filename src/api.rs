// HTTP routes (axum)
// /seed and /query keep their bare JSON shapes; the dashboard reads under
// /api use the ApiResponse envelope.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::bootstrap::{Cancellation, Loader, Summary};
use crate::error::QueryError;
use crate::gateway::Gateway;
use crate::queries;
use crate::seed_data::SeedData;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub seed: Arc<SeedData>,
    pub seed_timeout: Duration,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        let body = ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

fn api_error(err: QueryError) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: false,
        data: None,
        error: Some(err.to_string()),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn error_envelope(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
}

/// Only a complete run is reported as a success.
fn seed_message(summary: &Summary) -> String {
    if summary.cancelled {
        let suffix = if summary.rolled_back { ", nothing written" } else { "" };
        return format!("Seeding cancelled{}", suffix);
    }

    match summary.failures().count() {
        0 => "Database seeded successfully".to_string(),
        n => format!("Database seeded with {} failed records", n),
    }
}

fn api_result<T: Serialize>(result: Result<T, QueryError>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(err) => api_error(err),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /seed - Create tables and load the seed datasets
async fn seed(State(state): State<AppState>) -> Response {
    let loader = Loader::new(state.gateway.clone(), state.seed.clone());
    let cancel = Cancellation::with_timeout(state.seed_timeout);

    match loader.run_until(&cancel).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "message": seed_message(&summary),
                "summary": summary,
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "seeding failed");
            error_envelope(err.to_string())
        }
    }
}

/// GET /query - Diagnostic lookup of invoices with the fixed amount
async fn query(State(state): State<AppState>) -> Response {
    match queries::fetch_invoices_by_amount(state.gateway.as_ref(), queries::DIAGNOSTIC_AMOUNT).await {
        Ok(invoices) => (StatusCode::OK, Json(invoices)).into_response(),
        Err(err) => error_envelope(err.to_string()),
    }
}

/// GET /api/health - Health check
async fn health_check() -> Response {
    ApiResponse::ok("OK")
}

/// GET /api/revenue
async fn revenue(State(state): State<AppState>) -> Response {
    api_result(queries::fetch_revenue(state.gateway.as_ref()).await)
}

/// GET /api/cards
async fn cards(State(state): State<AppState>) -> Response {
    api_result(queries::fetch_card_data(state.gateway.as_ref()).await)
}

/// GET /api/invoices/latest
async fn latest_invoices(State(state): State<AppState>) -> Response {
    api_result(queries::fetch_latest_invoices(state.gateway.as_ref()).await)
}

#[derive(Debug, Deserialize)]
struct InvoiceSearch {
    #[serde(default)]
    query: String,
    #[serde(default = "first_page")]
    page: i64,
}

fn first_page() -> i64 {
    1
}

/// GET /api/invoices?query=&page= - Invoices filtered by customer name
async fn filtered_invoices(
    State(state): State<AppState>,
    Query(search): Query<InvoiceSearch>,
) -> Response {
    api_result(queries::fetch_filtered_invoices(state.gateway.as_ref(), &search.query, search.page).await)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/revenue", get(revenue))
        .route("/cards", get(cards))
        .route("/invoices", get(filtered_invoices))
        .route("/invoices/latest", get(latest_invoices));

    Router::new()
        .route("/seed", get(seed))
        .route("/query", get(query))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
