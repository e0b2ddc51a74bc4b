//! SQLite backend, reachable through raw `sqlite:` connection strings

use super::{
    connection_err, execution_err, hex_bytes, introspection_err, ColumnInfo, DatabaseBackend,
    PoolSettings, QueryOutput, Row,
};
use crate::connection_url::Dialect;
use crate::error::Result;
use crate::statement::StatementKind;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url).map_err(connection_err)?;

        // An in-memory database lives only as long as one of its connections,
        // so keep exactly one open for the lifetime of the pool.
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(settings.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(connection_err)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(connection_err)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_err)?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn columns(&self) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT m.name, p.name, p.type, p."notnull"
            FROM sqlite_master m
            JOIN pragma_table_info(m.name) p
            WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
            ORDER BY m.name, p.cid
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_err)?;

        Ok(rows
            .into_iter()
            .map(|(table, name, data_type, not_null)| ColumnInfo {
                table,
                name,
                data_type,
                nullable: not_null == 0,
            })
            .collect())
    }

    async fn execute(&self, sql: &str, kind: StatementKind) -> Result<QueryOutput> {
        let mut tx = self.pool.begin().await.map_err(execution_err)?;
        match kind {
            StatementKind::Read => {
                let rows = sqlx::Executor::fetch_all(&mut *tx, sqlx::raw_sql(sql))
                    .await
                    .map_err(execution_err)?;
                let columns: Vec<String> = match rows.first() {
                    Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
                    // No row to read names from; ask the driver to describe the statement.
                    None => sqlx::Executor::describe(&mut *tx, sql)
                        .await
                        .map(|d| d.columns().iter().map(|c| c.name().to_string()).collect())
                        .unwrap_or_default(),
                };
                tx.rollback().await.map_err(execution_err)?;
                Ok(QueryOutput::read(columns, rows.iter().map(row_to_json).collect()))
            }
            StatementKind::Write => {
                let result = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(sql))
                    .await
                    .map_err(execution_err)?;
                tx.commit().await.map_err(execution_err)?;
                Ok(QueryOutput::written(result.rows_affected()))
            }
        }
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_json(row: &SqliteRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_value(row, idx));
    }
    out
}

/// SQLite is dynamically typed: dispatch on the storage class of the value
/// itself rather than the declared column type.
fn decode_value(row: &SqliteRow, idx: usize) -> Value {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    let decoded = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(idx).map(Value::from),
        "REAL" | "NUMERIC" => row.try_get_unchecked::<f64, _>(idx).map(Value::from),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|b| hex_bytes(&b)),
        _ => row.try_get_unchecked::<String, _>(idx).map(Value::String),
    };

    decoded.unwrap_or_else(|_| Value::String(format!("<{}>", storage.to_lowercase())))
}
