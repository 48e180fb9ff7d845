// Invoice Dashboard - Web Server

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use invoice_dashboard::api::{router, AppState};
use invoice_dashboard::{Config, SqliteGateway};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Failed to read configuration")?;
    let seed = config.seed_data()?;

    let gateway = SqliteGateway::from_config(&config)
        .with_context(|| format!("Failed to open {}", config.database_url))?;

    let state = AppState {
        gateway: Arc::new(gateway),
        seed: Arc::new(seed),
        seed_timeout: config.seed_timeout,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "server listening");
    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   Seed:  GET /seed");
    println!("   Query: GET /query");
    println!("   API:   GET /api/cards, /api/revenue, /api/invoices, /api/invoices/latest\n");

    axum::serve(listener, router(state))
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
