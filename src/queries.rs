// 📊 Dashboard reads
// Every read runs through Gateway::select and maps failures to a
// user-facing QueryError.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::error::{GatewayError, QueryError};
use crate::gateway::{Gateway, Row};

pub const ITEMS_PER_PAGE: i64 = 6;
pub const LATEST_INVOICES: i64 = 5;
/// Amount matched by the diagnostic `/query` lookup.
pub const DIAGNOSTIC_AMOUNT: i64 = 666;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRow {
    pub month: String,
    pub revenue: i64,
}

/// Invoice joined with its customer's name (diagnostic lookup).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceWithCustomer {
    pub amount: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestInvoice {
    pub id: String,
    pub amount: String,
    pub name: String,
    pub image_url: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTableRow {
    pub id: String,
    pub customer_id: String,
    pub amount: i64,
    pub date: String,
    pub status: String,
    pub name: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub number_of_customers: i64,
    pub number_of_invoices: i64,
    pub total_paid_invoices: String,
    pub total_pending_invoices: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Salted hash, never the plaintext.
    pub password: String,
}

// ============================================================================
// HELPERS
// ============================================================================

fn decode<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, GatewayError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| GatewayError::Query(format!("unexpected row shape: {}", e)))
        })
        .collect()
}

async fn fetch<T: DeserializeOwned>(
    gateway: &dyn Gateway,
    message: &'static str,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<T>, QueryError> {
    let result = match gateway.select(sql, params).await {
        Ok(rows) => decode(rows),
        Err(err) => Err(err),
    };

    result.map_err(|source| {
        error!(error = %source, "database error: {}", message);
        QueryError::new(message, source)
    })
}

/// Format cents as dollars: `123456` becomes `$1,234.56`.
pub fn format_currency(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, digit) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

// ============================================================================
// QUERIES
// ============================================================================

pub async fn fetch_revenue(gateway: &dyn Gateway) -> Result<Vec<RevenueRow>, QueryError> {
    fetch(
        gateway,
        "Failed to fetch revenue data.",
        "SELECT month, revenue FROM revenue ORDER BY month",
        vec![],
    )
    .await
}

pub async fn fetch_invoices_by_amount(
    gateway: &dyn Gateway,
    amount: i64,
) -> Result<Vec<InvoiceWithCustomer>, QueryError> {
    fetch(
        gateway,
        "Failed to fetch invoices.",
        "SELECT invoices.amount, customers.name
         FROM invoices
         JOIN customers ON invoices.customer_id = customers.id
         WHERE invoices.amount = ?1
         ORDER BY invoices.date DESC",
        vec![Value::from(amount)],
    )
    .await
}

pub async fn fetch_latest_invoices(gateway: &dyn Gateway) -> Result<Vec<LatestInvoice>, QueryError> {
    #[derive(Deserialize)]
    struct Raw {
        id: String,
        amount: i64,
        name: String,
        image_url: String,
        email: String,
    }

    let raw: Vec<Raw> = fetch(
        gateway,
        "Failed to fetch the latest invoices.",
        "SELECT invoices.id, invoices.amount, customers.name, customers.image_url, customers.email
         FROM invoices
         JOIN customers ON invoices.customer_id = customers.id
         ORDER BY invoices.date DESC
         LIMIT ?1",
        vec![Value::from(LATEST_INVOICES)],
    )
    .await?;

    Ok(raw
        .into_iter()
        .map(|r| LatestInvoice {
            id: r.id,
            amount: format_currency(r.amount),
            name: r.name,
            image_url: r.image_url,
            email: r.email,
        })
        .collect())
}

/// Counts plus total invoice amount per status.
pub async fn fetch_card_data(gateway: &dyn Gateway) -> Result<CardData, QueryError> {
    #[derive(Deserialize)]
    struct Totals {
        customers: i64,
        invoices: i64,
        paid: i64,
        pending: i64,
    }

    let totals: Vec<Totals> = fetch(
        gateway,
        "Failed to fetch card data.",
        "SELECT
            (SELECT COUNT(*) FROM customers) AS customers,
            (SELECT COUNT(*) FROM invoices) AS invoices,
            (SELECT COALESCE(SUM(amount), 0) FROM invoices WHERE status = 'paid') AS paid,
            (SELECT COALESCE(SUM(amount), 0) FROM invoices WHERE status = 'pending') AS pending",
        vec![],
    )
    .await?;

    let totals = totals.into_iter().next().unwrap_or(Totals {
        customers: 0,
        invoices: 0,
        paid: 0,
        pending: 0,
    });

    Ok(CardData {
        number_of_customers: totals.customers,
        number_of_invoices: totals.invoices,
        total_paid_invoices: format_currency(totals.paid),
        total_pending_invoices: format_currency(totals.pending),
    })
}

/// Invoices whose customer name contains `query`, newest first.
/// `page` starts at 1; anything lower is treated as 1.
pub async fn fetch_filtered_invoices(
    gateway: &dyn Gateway,
    query: &str,
    page: i64,
) -> Result<Vec<InvoiceTableRow>, QueryError> {
    let offset = page.max(1).saturating_sub(1).saturating_mul(ITEMS_PER_PAGE);

    fetch(
        gateway,
        "Failed to fetch invoices.",
        "SELECT invoices.id, invoices.customer_id, invoices.amount, invoices.date, invoices.status,
                customers.name, customers.email, customers.image_url
         FROM invoices
         JOIN customers ON invoices.customer_id = customers.id
         WHERE LOWER(customers.name) LIKE '%' || LOWER(?1) || '%'
         ORDER BY invoices.date DESC, invoices.id
         LIMIT ?2 OFFSET ?3",
        vec![Value::from(query), Value::from(ITEMS_PER_PAGE), Value::from(offset)],
    )
    .await
}

pub async fn fetch_user_by_email(
    gateway: &dyn Gateway,
    email: &str,
) -> Result<Option<UserRecord>, QueryError> {
    let users: Vec<UserRecord> = fetch(
        gateway,
        "Failed to fetch user.",
        "SELECT id, name, email, password FROM users WHERE email = ?1",
        vec![Value::from(email)],
    )
    .await?;

    Ok(users.into_iter().next())
}
