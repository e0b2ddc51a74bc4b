//! PostgreSQL backend

use super::{
    connection_err, execution_err, introspection_err, number_or_string, ColumnInfo,
    DatabaseBackend, PoolSettings, QueryOutput, Row,
};
use crate::connection_url::Dialect;
use crate::error::Result;
use crate::statement::StatementKind;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::BigDecimal;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
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
impl DatabaseBackend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_err)?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn columns(&self) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT c.table_name::text, c.column_name::text, c.data_type::text, c.is_nullable::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
              ON t.table_schema = c.table_schema AND t.table_name = c.table_name
            WHERE c.table_schema = current_schema()
              AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(introspection_err)?;

        Ok(rows
            .into_iter()
            .map(|(table, name, data_type, nullable)| ColumnInfo {
                table,
                name,
                data_type,
                nullable: nullable.eq_ignore_ascii_case("YES"),
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

fn row_to_json(row: &PgRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_value(row, idx));
    }
    out
}

fn decode_value(row: &PgRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }

    let type_name = row.columns()[idx].type_info().name().to_uppercase();
    let decoded = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::from),
        "INT2" => row.try_get::<i16, _>(idx).map(Value::from),
        "INT4" => row.try_get::<i32, _>(idx).map(Value::from),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::from),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(Value::from),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(Value::from),
        "NUMERIC" => row
            .try_get::<BigDecimal, _>(idx)
            .map(|d| number_or_string(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .map(|u| Value::String(u.to_string())),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(|d| Value::String(d.to_string())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|d| Value::String(d.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|d| Value::String(d.to_rfc3339())),
        _ => row.try_get_unchecked::<String, _>(idx).map(Value::String),
    };

    decoded
        .or_else(|_| row.try_get_unchecked::<String, _>(idx).map(Value::String))
        .unwrap_or_else(|_| Value::String(format!("<{}>", type_name.to_lowercase())))
}
