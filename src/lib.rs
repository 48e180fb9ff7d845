// Invoice Dashboard - Core Library
// Exposes the store gateway, the seed loader and the dashboard reads for the
// CLI, the API server and tests

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod password;
pub mod queries;
pub mod schema;
pub mod seed_data;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use bootstrap::{Cancellation, Loader, PhaseSummary, RecordFailure, Summary};
pub use config::{Config, Credential};
pub use error::{BootstrapError, GatewayError, QueryError, RecordError};
pub use gateway::{Gateway, RecordWriter, Row, Session, SqliteGateway};
pub use models::{Customer, EntityKind, Invoice, InvoiceStatus, Revenue, User};
pub use queries::{
    fetch_card_data, fetch_filtered_invoices, fetch_invoices_by_amount, fetch_latest_invoices,
    fetch_revenue, fetch_user_by_email, format_currency, CardData,
};
pub use schema::TableSpec;
pub use seed_data::SeedData;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
