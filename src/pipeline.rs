//! Staged query pipeline
//!
//! Turning a question into data takes two calls. `generate` classifies the
//! input, reads the live schema, asks the text-generation service for SQL
//! and stages the cleaned statement. `execute` takes the staged statement,
//! runs it and asks the service to explain the rows.
//!
//! Per session the protocol is a small state machine:
//!
//! ```text
//!            generate              execute (ok or error)
//!   Idle ───────────────▶ Staged ───────────────────────▶ Idle
//!                          │  ▲
//!                          └──┘ generate again (last stage wins)
//! ```
//!
//! Small talk never leaves `Idle`, and `execute` from `Idle` fails with
//! `NoPendingQuery`.

use crate::db::Row;
use crate::error::{GatewayError, Result};
use crate::intent::{self, Intent};
use crate::llm::{Prompt, TextGenerator};
use crate::prompts::{is_refusal, sql_generation_prompt, summary_prompt};
use crate::registry::ConnectionRegistry;
use crate::session::{CredentialStore, SessionId};
use crate::staging::QueryStagingStore;
use crate::statement::{normalize_generated_sql, StatementKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub llm_timeout: Duration,
    pub query_timeout: Duration,
    pub sample_rows: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(30),
            sample_rows: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerateOutcome {
    /// Small talk; nothing was generated or staged.
    Acknowledged { reply: String },
    /// A candidate statement, now staged. `refusal` is set when the service
    /// answered with one of its fixed refusal sentences instead of SQL.
    Generated { query: String, refusal: bool },
}

impl GenerateOutcome {
    pub fn query(&self) -> Option<&str> {
        match self {
            GenerateOutcome::Generated { query, .. } => Some(query),
            GenerateOutcome::Acknowledged { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub question: String,
    pub sql: String,
    pub kind: StatementKind,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub explanation: String,
}

pub struct QueryPipeline {
    registry: Arc<ConnectionRegistry>,
    staging: Arc<QueryStagingStore>,
    credentials: Arc<CredentialStore>,
    generator: Arc<dyn TextGenerator>,
    settings: PipelineSettings,
}

impl QueryPipeline {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        staging: Arc<QueryStagingStore>,
        credentials: Arc<CredentialStore>,
        generator: Arc<dyn TextGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            staging,
            credentials,
            generator,
            settings,
        }
    }

    pub async fn generate(&self, session: SessionId, question: &str) -> Result<GenerateOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(GatewayError::MissingQuestion);
        }
        let api_key = self
            .credentials
            .get(session)
            .ok_or(GatewayError::MissingCredential)?;
        let lease = self.registry.get(session).await?;

        if let Intent::Conversational(kind) = intent::classify(question) {
            debug!(session = %session, ?kind, "conversational input, skipping SQL generation");
            return Ok(GenerateOutcome::Acknowledged {
                reply: intent::acknowledgement(kind).to_string(),
            });
        }

        let started = Instant::now();
        let dialect = lease.dialect();
        let schema = bounded(
            self.settings.query_timeout,
            "schema introspection",
            lease.describe(self.settings.sample_rows),
        )
        .await?;
        drop(lease);
        let tables = schema.table_names();
        debug!(session = %session, tables = tables.len(), "schema introspected");

        let prompt = sql_generation_prompt(dialect, &tables, &schema, question);
        let raw = self.ask(&api_key, &prompt).await?;
        let sql = normalize_generated_sql(&raw);
        let refusal = is_refusal(&sql);

        self.staging.stage(session, question, sql.clone());
        info!(
            session = %session,
            refusal,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query generated and staged"
        );

        Ok(GenerateOutcome::Generated { query: sql, refusal })
    }

    pub async fn execute(&self, session: SessionId) -> Result<ExecutionReport> {
        let api_key = self
            .credentials
            .get(session)
            .ok_or(GatewayError::MissingCredential)?;
        let lease = self.registry.get(session).await?;
        let pending = self.staging.take_and_clear(session)?;

        let started = Instant::now();
        let kind = StatementKind::classify(&pending.sql);
        // A timed-out statement is dropped mid-transaction, which rolls it back.
        let output = bounded(
            self.settings.query_timeout,
            "query execution",
            lease.execute(&pending.sql),
        )
        .await
        .map_err(|e| {
            warn!(session = %session, ?kind, error = %e, "staged query failed");
            e
        })?;
        drop(lease);
        info!(
            session = %session,
            ?kind,
            rows = output.rows.len(),
            rows_affected = output.rows_affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "staged query executed"
        );

        let prompt = summary_prompt(&pending.question, &pending.sql, &output.rows);
        let explanation = self.ask(&api_key, &prompt).await?.trim().to_string();

        Ok(ExecutionReport {
            question: pending.question,
            sql: pending.sql,
            kind,
            columns: output.columns,
            rows: output.rows,
            rows_affected: output.rows_affected,
            explanation,
        })
    }

    async fn ask(&self, api_key: &str, prompt: &Prompt) -> Result<String> {
        bounded(
            self.settings.llm_timeout,
            "text generation",
            self.generator.generate(api_key, prompt),
        )
        .await
    }
}

async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(format!(
            "{what} exceeded {}s",
            limit.as_secs_f32()
        ))),
    }
}
