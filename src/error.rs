//! Error types shared by the gateway, the bootstrap loader and the read path.

use serde::Serialize;
use thiserror::Error;

/// Failure reported by a data store gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("schema error on `{table}`: {message}")]
    Schema { table: String, message: String },

    #[error("constraint conflict: {0}")]
    Conflict(String),

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("query rejected: {0}")]
    Query(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }
}

/// Fatal failure of a whole bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to create table `{table}`: {source}")]
    Schema {
        table: &'static str,
        #[source]
        source: GatewayError,
    },

    #[error("seeding aborted: {0}")]
    Transport(#[source] GatewayError),

    #[error("invalid seed data: {0}")]
    InvalidSeed(String),
}

/// Outcome of a single record that could not be written.
///
/// These never abort a run on their own; they are collected into the
/// [`Summary`](crate::bootstrap::Summary).
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("missing `{table}` row `{key}`")]
    Dependency { table: String, key: String },

    #[error("transport: {message}")]
    Transport { message: String },

    #[error("rejected: {message}")]
    Rejected { message: String },
}

impl From<GatewayError> for RecordError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Conflict(message) => RecordError::Conflict { message },
            GatewayError::Transport(message) => RecordError::Transport { message },
            other => RecordError::Rejected {
                message: other.to_string(),
            },
        }
    }
}

/// Read-path failure. Displays only the user-facing message; the gateway
/// error stays reachable through `source()`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct QueryError {
    pub message: &'static str,
    #[source]
    pub source: GatewayError,
}

impl QueryError {
    pub fn new(message: &'static str, source: GatewayError) -> Self {
        QueryError { message, source }
    }
}
