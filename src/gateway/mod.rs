//! Data store gateway abstraction.
//!
//! The loader and the dashboard reads only talk to these traits. A gateway
//! offers three capabilities: idempotent table creation, upsert by natural
//! key, and an optional transactional [`Session`].

pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::schema::TableSpec;

pub use sqlite::{SqliteGateway, SqliteSession};

/// One row, column name to value.
pub type Row = Map<String, Value>;

/// Write capability shared by the gateway itself and by an open session.
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Insert `row` into `table`, overwriting the existing row whose
    /// `key_column` matches.
    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), GatewayError>;

    /// Whether `table` has a row with `column = value`.
    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, GatewayError>;
}

/// A transaction that owns the store exclusively until it is finished.
///
/// Implementations must roll back when dropped without [`Session::commit`].
#[async_trait]
pub trait Session: RecordWriter {
    async fn commit(&self) -> Result<(), GatewayError>;
    async fn rollback(&self) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait Gateway: RecordWriter {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), GatewayError>;

    /// Open a session, or `None` when transactions are unavailable.
    async fn begin(&self) -> Result<Option<Arc<dyn Session>>, GatewayError>;

    /// Run a read statement with positional parameters.
    async fn select(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, GatewayError>;
}
