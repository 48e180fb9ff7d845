// SQLite gateway (rusqlite)
// One connection behind an async mutex. A session takes the connection
// for itself until it commits, rolls back or is dropped.

use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::{Gateway, RecordWriter, Row, Session};
use crate::config::Config;
use crate::error::GatewayError;
use crate::schema::TableSpec;

pub const MEMORY_URL: &str = "sqlite::memory:";

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
            _ => None,
        };

        match code {
            Some(ErrorCode::ConstraintViolation) => GatewayError::Conflict(err.to_string()),
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::DiskFull,
            ) => GatewayError::Transport(err.to_string()),
            _ => GatewayError::Query(err.to_string()),
        }
    }
}

// ============================================================================
// STATEMENT HELPERS (shared by gateway and session)
// ============================================================================

/// Table and column names are interpolated into SQL, so only plain
/// identifiers are accepted.
fn ident(name: &str) -> Result<&str, GatewayError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(name)
    } else {
        Err(GatewayError::Query(format!("invalid identifier `{}`", name)))
    }
}

/// Integers outside the i64 range are refused rather than stored as REAL.
fn to_sql(value: &Value) -> Result<SqlValue, GatewayError> {
    let sql = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match (n.as_i64(), n.is_f64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, true) => SqlValue::Real(n.as_f64().unwrap_or_default()),
            (None, false) => {
                return Err(GatewayError::Query(format!("integer {} out of range", n)));
            }
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    };
    Ok(sql)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn upsert_on(conn: &Connection, table: &str, key_column: &str, row: &Row) -> Result<(), GatewayError> {
    let table = ident(table)?;
    let key_column = ident(key_column)?;

    if !row.contains_key(key_column) {
        return Err(GatewayError::Query(format!(
            "row for `{}` has no `{}` value",
            table, key_column
        )));
    }

    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (column, value) in row {
        columns.push(ident(column)?);
        values.push(to_sql(value)?);
    }

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != key_column)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        table,
        columns.join(", "),
        placeholders.join(", "),
        key_column,
        on_conflict
    );

    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(())
}

fn exists_on(conn: &Connection, table: &str, column: &str, value: &str) -> Result<bool, GatewayError> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
        ident(table)?,
        ident(column)?
    );
    let found: bool = conn.query_row(&sql, [value], |row| row.get(0))?;
    Ok(found)
}

fn select_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, GatewayError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let values = params.iter().map(to_sql).collect::<Result<Vec<_>, _>>()?;

    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (i, name) in columns.iter().enumerate() {
            map.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(map);
    }

    Ok(out)
}

// ============================================================================
// GATEWAY
// ============================================================================

pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
    transactional: bool,
}

impl SqliteGateway {
    /// Open a gateway for `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>`
    /// or a bare file path.
    pub fn connect(url: &str, transactional: bool) -> Result<Self, GatewayError> {
        let url = url.trim();
        let in_memory = matches!(url, MEMORY_URL | ":memory:");

        let conn = if in_memory {
            Connection::open_in_memory()
        } else {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .unwrap_or(url);

            if path.is_empty() || path.contains("://") {
                return Err(GatewayError::Transport(format!(
                    "unsupported database url `{}`",
                    url
                )));
            }
            Connection::open(path)
        }
        .map_err(|e| GatewayError::Transport(format!("cannot open `{}`: {}", url, e)))?;

        conn.pragma_update(None, "foreign_keys", true)?;
        if !in_memory {
            // Enable WAL mode for crash recovery
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "sqlite journal mode set");
        }

        info!(url, transactional, "sqlite gateway opened");

        Ok(SqliteGateway {
            conn: Arc::new(Mutex::new(conn)),
            transactional,
        })
    }

    /// Open the configured store. SQLite has no access control, so the
    /// credential only decides what gets logged.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        info!(role = config.credential.role(), "using store credential");
        Self::connect(&config.database_url, config.transactional)
    }

    pub fn in_memory() -> Result<Self, GatewayError> {
        Self::connect(MEMORY_URL, true)
    }
}

#[async_trait]
impl RecordWriter for SqliteGateway {
    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), GatewayError> {
        let conn = self.conn.lock().await;
        upsert_on(&conn, table, key_column, &row)
    }

    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, GatewayError> {
        let conn = self.conn.lock().await;
        exists_on(&conn, table, column, value)
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), GatewayError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(spec.ddl).map_err(|e| GatewayError::Schema {
            table: spec.name.to_string(),
            message: e.to_string(),
        })
    }

    async fn begin(&self) -> Result<Option<Arc<dyn Session>>, GatewayError> {
        if !self.transactional {
            return Ok(None);
        }

        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("sqlite session started");

        Ok(Some(Arc::new(SqliteSession {
            conn: StdMutex::new(Some(conn)),
        })))
    }

    async fn select(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, GatewayError> {
        let conn = self.conn.lock().await;
        select_on(&conn, sql, &params)
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct SqliteSession {
    /// `None` once committed or rolled back.
    conn: StdMutex<Option<OwnedMutexGuard<Connection>>>,
}

impl SqliteSession {
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let slot = self
            .conn
            .lock()
            .map_err(|_| GatewayError::Transport("session lock poisoned".to_string()))?;

        match slot.as_ref() {
            Some(conn) => f(&**conn),
            None => Err(GatewayError::Transport("session already finished".to_string())),
        }
    }

    fn finish(&self, statement: &str) -> Result<(), GatewayError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| GatewayError::Transport("session lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| GatewayError::Transport("session already finished".to_string()))?;

        if let Err(err) = conn.execute_batch(statement) {
            // Never hand the connection back with the transaction still open.
            if conn.is_autocommit() {
                return Err(err.into());
            }
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                warn!(error = %rollback_err, "rollback after failed {} also failed", statement);
            }
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RecordWriter for SqliteSession {
    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), GatewayError> {
        self.with_conn(|conn| upsert_on(conn, table, key_column, &row))
    }

    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, GatewayError> {
        self.with_conn(|conn| exists_on(conn, table, column, value))
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn commit(&self) -> Result<(), GatewayError> {
        self.finish("COMMIT")?;
        debug!("sqlite session committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), GatewayError> {
        self.finish("ROLLBACK")?;
        debug!("sqlite session rolled back");
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        let slot = match self.conn.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(conn) = slot.take() {
            warn!("session dropped without commit, rolling back");
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CUSTOMERS, TABLES, USERS};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    async fn gateway() -> SqliteGateway {
        let gw = SqliteGateway::in_memory().unwrap();
        for spec in TABLES {
            gw.ensure_table(&spec).await.unwrap();
        }
        gw
    }

    async fn count(gw: &SqliteGateway, table: &str) -> i64 {
        let rows = gw
            .select(&format!("SELECT COUNT(*) AS n FROM {}", table), vec![])
            .await
            .unwrap();
        rows[0]["n"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_ensure_table_twice_is_harmless() {
        let gw = gateway().await;
        gw.ensure_table(&CUSTOMERS).await.unwrap();
        assert_eq!(count(&gw, "customers").await, 0);
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_overwrites() {
        let gw = gateway().await;

        gw.upsert("revenue", "month", row(json!({"month": "2024-01", "revenue": 100})))
            .await
            .unwrap();
        gw.upsert("revenue", "month", row(json!({"month": "2024-01", "revenue": 250})))
            .await
            .unwrap();

        let rows = gw.select("SELECT month, revenue FROM revenue", vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["revenue"], 250);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let gw = gateway().await;

        gw.upsert(
            "users",
            "id",
            row(json!({"id": "u1", "name": "Al", "email": "a@x.com", "password": "h"})),
        )
        .await
        .unwrap();

        let err = gw
            .upsert(
                "users",
                "id",
                row(json!({"id": "u2", "name": "Al2", "email": "a@x.com", "password": "h"})),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_upsert_updates_every_non_key_column() {
        let gw = gateway().await;
        let customer = |name: &str| {
            row(json!({"id": "c1", "name": name, "email": "b@x.com", "image_url": "/b.png"}))
        };

        gw.upsert("customers", "id", customer("Bo")).await.unwrap();
        gw.upsert("customers", "id", customer("Bob")).await.unwrap();

        let rows = gw.select("SELECT id, name FROM customers", vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "c1");
        assert_eq!(rows[0]["name"], "Bob");
    }

    #[tokio::test]
    async fn test_integer_beyond_i64_is_refused() {
        let gw = gateway().await;
        let err = gw
            .upsert("revenue", "month", row(json!({"month": "2024-04", "revenue": u64::MAX})))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Query(ref m) if m.contains("out of range")), "got {:?}", err);
        assert_eq!(count(&gw, "revenue").await, 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_identifiers() {
        let gw = gateway().await;
        let err = gw
            .upsert("users; DROP TABLE users", "id", row(json!({"id": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Query(_)));

        let err = gw.exists("users", "1id", "x").await.unwrap_err();
        assert!(matches!(err, GatewayError::Query(_)));
    }

    #[tokio::test]
    async fn test_bad_ddl_is_schema_error() {
        let gw = SqliteGateway::in_memory().unwrap();
        let broken = TableSpec {
            ddl: "CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY,",
            ..USERS
        };
        let err = gw.ensure_table(&broken).await.unwrap_err();
        assert!(matches!(err, GatewayError::Schema { ref table, .. } if table == "users"));
    }

    #[tokio::test]
    async fn test_session_commit_persists() {
        let gw = gateway().await;
        let session = gw.begin().await.unwrap().unwrap();

        session
            .upsert(
                "customers",
                "id",
                row(json!({"id": "c1", "name": "Bo", "email": "b@x.com", "image_url": "/b.png"})),
            )
            .await
            .unwrap();
        assert!(session.exists("customers", "id", "c1").await.unwrap());

        session.commit().await.unwrap();
        drop(session);

        assert!(gw.exists("customers", "id", "c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_session_dropped_without_commit_rolls_back() {
        let gw = gateway().await;
        {
            let session = gw.begin().await.unwrap().unwrap();
            session
                .upsert("revenue", "month", row(json!({"month": "2024-02", "revenue": 9})))
                .await
                .unwrap();
        }

        assert_eq!(count(&gw, "revenue").await, 0);
    }

    #[tokio::test]
    async fn test_finished_session_refuses_writes() {
        let gw = gateway().await;
        let session = gw.begin().await.unwrap().unwrap();
        session.rollback().await.unwrap();

        let err = session
            .upsert("revenue", "month", row(json!({"month": "2024-03", "revenue": 1})))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_non_transactional_gateway_has_no_session() {
        let gw = SqliteGateway::connect(MEMORY_URL, false).unwrap();
        assert!(gw.begin().await.unwrap().is_none());
    }

    #[test]
    fn test_unsupported_url() {
        let err = SqliteGateway::connect("https://project.example.co", true).err().unwrap();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("dash.db").display());

        let gw = SqliteGateway::connect(&url, true).unwrap();
        gw.ensure_table(&USERS).await.unwrap();
        gw.upsert(
            "users",
            "id",
            row(json!({"id": "u1", "name": "Al", "email": "a@x.com", "password": "h"})),
        )
        .await
        .unwrap();
        drop(gw);

        let reopened = SqliteGateway::connect(&url, true).unwrap();
        assert!(reopened.exists("users", "email", "a@x.com").await.unwrap());
    }
}
