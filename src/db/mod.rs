//! Database handles
//!
//! A `ConnectionHandle` is built once at registration time and exposes the
//! capabilities the pipeline needs (table names, schema description,
//! statement execution) regardless of which driver sits underneath.

pub mod mysql;
pub mod postgres;
pub mod schema;
pub mod sqlite;

use crate::connection_url::{redact, Dialect};
use crate::error::{GatewayError, Result};
use crate::statement::StatementKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use schema::{ColumnInfo, SchemaDescription, TableSchema};

/// One result row, keyed by column name in select-list order.
pub type Row = serde_json::Map<String, Value>;

/// Rows and metadata produced by running a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryOutput {
    /// Rows of a read, with column names reported by the driver. Names stay
    /// known even when no row came back.
    pub fn read(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            columns,
            rows,
            rows_affected,
        }
    }

    pub fn written(rows_affected: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected,
        }
    }
}

/// Pool sizing applied when a handle is opened.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Driver-specific operations behind a handle.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Base tables of the current schema, sorted by name.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Columns of every base table, grouped by table in ordinal order.
    async fn columns(&self) -> Result<Vec<ColumnInfo>>;

    /// Runs `sql`. Reads run in a transaction that is rolled back; writes
    /// run in a transaction that is committed.
    async fn execute(&self, sql: &str, kind: StatementKind) -> Result<QueryOutput>;

    /// Quotes an identifier for this dialect.
    fn quote_ident(&self, ident: &str) -> String;

    async fn close(&self);
}

#[derive(Clone)]
pub struct ConnectionHandle {
    backend: Arc<dyn DatabaseBackend>,
    display_url: String,
    opened_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(backend: Arc<dyn DatabaseBackend>, display_url: String) -> Self {
        Self {
            backend,
            display_url,
            opened_at: Utc::now(),
        }
    }

    /// Opens a pool for `url` and checks it with a liveness probe.
    pub async fn open(url: &str, settings: &PoolSettings) -> Result<Self> {
        let dialect = Dialect::from_url(url).ok_or_else(|| {
            GatewayError::Connection(format!(
                "unrecognized connection string scheme in '{}'",
                redact(url)
            ))
        })?;
        let driver_url = strip_driver_suffix(url);

        debug!(dialect = %dialect, url = %redact(url), "opening connection pool");
        let backend: Arc<dyn DatabaseBackend> = match dialect {
            Dialect::Postgres => Arc::new(postgres::PostgresBackend::connect(&driver_url, settings).await?),
            Dialect::MySql => Arc::new(mysql::MySqlBackend::connect(&driver_url, settings).await?),
            Dialect::Sqlite => Arc::new(sqlite::SqliteBackend::connect(&driver_url, settings).await?),
        };
        info!(dialect = %dialect, url = %redact(url), "database connected");

        Ok(Self::new(backend, redact(url)))
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn display_url(&self) -> &str {
        &self.display_url
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.backend.table_names().await
    }

    /// Re-reads the live schema; nothing is cached between calls.
    pub async fn describe(&self, sample_rows: usize) -> Result<SchemaDescription> {
        let names = self.backend.table_names().await?;
        let columns = self.backend.columns().await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let table_columns: Vec<ColumnInfo> = columns
                .iter()
                .filter(|c| c.table == name)
                .cloned()
                .collect();
            let sample = if sample_rows > 0 {
                let sql = format!(
                    "SELECT * FROM {} LIMIT {}",
                    self.backend.quote_ident(&name),
                    sample_rows
                );
                let output = self
                    .backend
                    .execute(&sql, StatementKind::Read)
                    .await
                    .map_err(|e| GatewayError::Introspection(e.to_string()))?;
                Some(output)
            } else {
                None
            };
            tables.push(TableSchema {
                name,
                columns: table_columns,
                sample,
            });
        }

        Ok(SchemaDescription {
            dialect: self.dialect(),
            tables,
        })
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryOutput> {
        let kind = StatementKind::classify(sql);
        self.backend.execute(sql, kind).await
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("dialect", &self.dialect())
            .field("url", &self.display_url)
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// `postgresql+psycopg2://...` becomes `postgresql://...`.
fn strip_driver_suffix(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.contains('+') => {
            let base = scheme.split('+').next().unwrap_or(scheme);
            format!("{base}://{rest}")
        }
        _ => url.to_string(),
    }
}

pub(crate) fn introspection_err(e: sqlx::Error) -> GatewayError {
    GatewayError::Introspection(e.to_string())
}

pub(crate) fn execution_err(e: sqlx::Error) -> GatewayError {
    GatewayError::Execution(e.to_string())
}

pub(crate) fn connection_err(e: sqlx::Error) -> GatewayError {
    GatewayError::Connection(e.to_string())
}

/// Decimal text becomes a JSON number when it fits, else stays a string.
pub(crate) fn number_or_string(text: String) -> Value {
    match text.parse::<serde_json::Number>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(text),
    }
}

pub(crate) fn hex_bytes(bytes: &[u8]) -> Value {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Value::String(format!("\\x{hex}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_sqlalchemy_driver_names() {
        assert_eq!(
            strip_driver_suffix("postgresql+psycopg2://u:p@h:5432/d?sslmode=require"),
            "postgresql://u:p@h:5432/d?sslmode=require"
        );
        assert_eq!(strip_driver_suffix("mysql://u:p@h/d"), "mysql://u:p@h/d");
        assert_eq!(strip_driver_suffix("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn decimal_text_becomes_numbers() {
        assert_eq!(number_or_string("42".into()), json!(42));
        assert_eq!(number_or_string("12.50".into()), json!(12.5));
        assert_eq!(number_or_string("NaN".into()), json!("NaN"));
    }

    async fn memory_handle() -> ConnectionHandle {
        let handle = ConnectionHandle::open("sqlite::memory:", &PoolSettings::default())
            .await
            .unwrap();
        handle
            .execute("CREATE TABLE courses (id INTEGER PRIMARY KEY, title TEXT)")
            .await
            .unwrap();
        handle
            .execute("INSERT INTO courses (id, title) VALUES (1, 'Compilers')")
            .await
            .unwrap();
        handle
    }

    #[tokio::test]
    async fn empty_read_still_names_its_columns() {
        let handle = memory_handle().await;
        let output = handle
            .execute("SELECT id, title FROM courses WHERE id = 42")
            .await
            .unwrap();
        assert!(output.rows.is_empty());
        assert_eq!(output.columns, vec!["id", "title"]);
    }

    #[tokio::test]
    async fn read_prefixed_batches_are_rolled_back() {
        let handle = memory_handle().await;
        handle
            .execute("SELECT 1; INSERT INTO courses (id, title) VALUES (9, 'Sneaky')")
            .await
            .unwrap();
        let count = handle.execute("SELECT COUNT(*) AS n FROM courses").await.unwrap();
        assert_eq!(count.rows[0]["n"], json!(1));
        assert_eq!(count.columns, vec!["n"]);
    }

    #[tokio::test]
    async fn writes_report_affected_rows() {
        let handle = memory_handle().await;
        let output = handle
            .execute("UPDATE courses SET title = 'Parsing' WHERE id = 1")
            .await
            .unwrap();
        assert_eq!(output.rows_affected, 1);
        assert!(output.columns.is_empty());
    }

    #[tokio::test]
    async fn unknown_scheme_is_a_connection_error() {
        let err = ConnectionHandle::open("oracle://u:p@h/d", &PoolSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
        assert!(!err.to_string().contains(":p@"));
    }
}
