//! Session-scoped database gateway
//!
//! The operation surface a transport maps onto: open a session, register a
//! connection, set a credential, list tables, generate a query, execute
//! it. Every method takes the session it acts on; nothing leaks between
//! sessions.

use crate::config::GatewayConfig;
use crate::connection_url::{ConnectionParams, ConnectionTarget};
use crate::db::SchemaDescription;
use crate::error::{GatewayError, Result};
use crate::llm::{LlmClient, TextGenerator};
use crate::pipeline::{ExecutionReport, GenerateOutcome, PipelineSettings, QueryPipeline};
use crate::registry::ConnectionRegistry;
use crate::session::{CredentialStore, SessionId};
use crate::staging::{PendingQuery, QueryStagingStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Connection payload: either a finished connection string, or all six
/// parts needed to build one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub connection_string: Option<String>,
    pub db_type: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl ConnectRequest {
    pub fn from_connection_string(url: impl Into<String>) -> Self {
        Self {
            connection_string: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn into_target(self) -> Result<ConnectionTarget> {
        if let Some(url) = self.connection_string {
            if url.trim().is_empty() {
                return Err(GatewayError::MissingFields("connection_string".to_string()));
            }
            return Ok(ConnectionTarget::Url(url));
        }

        let fields = [
            ("db_type", &self.db_type),
            ("host", &self.host),
            ("port", &self.port),
            ("user", &self.user),
            ("password", &self.password),
            ("database", &self.database),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::MissingFields(missing.join(", ")));
        }

        Ok(ConnectionTarget::Params(ConnectionParams {
            db_type: self.db_type.unwrap_or_default(),
            user: self.user.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            host: self.host.unwrap_or_default(),
            port: self.port.unwrap_or_default(),
            database: self.database.unwrap_or_default(),
        }))
    }
}

pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    staging: Arc<QueryStagingStore>,
    credentials: Arc<CredentialStore>,
    pipeline: QueryPipeline,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.pool_settings()));
        let staging = Arc::new(QueryStagingStore::new());
        let credentials = Arc::new(CredentialStore::new());
        let pipeline = QueryPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&staging),
            Arc::clone(&credentials),
            generator,
            PipelineSettings {
                llm_timeout: config.llm_timeout,
                query_timeout: config.query_timeout,
                sample_rows: config.sample_rows,
            },
        );
        Self {
            registry,
            staging,
            credentials,
            pipeline,
            config,
        }
    }

    /// Gateway backed by the HTTP text-generation client described by `config`.
    pub fn with_llm_client(config: GatewayConfig) -> Self {
        let client = LlmClient::new(config.llm_model.clone(), config.llm_base_url.clone())
            .with_temperature(config.llm_temperature)
            .with_max_tokens(config.llm_max_tokens);
        debug!(model = client.model(), "text generation client configured");
        Self::new(config, Arc::new(client))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn open_session(&self) -> SessionId {
        let session = SessionId::new();
        debug!(session = %session, "session opened");
        session
    }

    /// Connects the session to a database and returns its tables.
    pub async fn register_connection(
        &self,
        session: SessionId,
        request: ConnectRequest,
    ) -> Result<Vec<String>> {
        let target = request.into_target()?;
        self.registry.register(session, &target).await?;
        self.list_tables(session).await
    }

    pub async fn list_tables(&self, session: SessionId) -> Result<Vec<String>> {
        let lease = self.registry.get(session).await?;
        lease.table_names().await
    }

    pub async fn describe_schema(&self, session: SessionId) -> Result<SchemaDescription> {
        let lease = self.registry.get(session).await?;
        lease.describe(self.config.sample_rows).await
    }

    pub fn set_credential(&self, session: SessionId, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(GatewayError::MissingCredential);
        }
        self.credentials.set(session, api_key.to_string());
        info!(session = %session, "API key set");
        Ok(())
    }

    pub async fn generate_query(&self, session: SessionId, question: &str) -> Result<GenerateOutcome> {
        self.pipeline.generate(session, question).await
    }

    pub async fn execute_query(&self, session: SessionId) -> Result<ExecutionReport> {
        self.pipeline.execute(session).await
    }

    pub fn pending_query(&self, session: SessionId) -> Option<PendingQuery> {
        self.staging.peek(session)
    }

    /// Drops everything held for the session and closes its connection.
    pub async fn close_session(&self, session: SessionId) {
        self.staging.clear(session);
        self.credentials.remove(session);
        self.registry.remove(session).await;
        debug!(session = %session, "session closed");
    }

    /// Closes sessions idle for longer than the configured TTL.
    pub async fn evict_idle(&self) -> Vec<SessionId> {
        let ttl = self.config.session_idle_ttl;
        let mut evicted = self.registry.evict_idle(ttl).await;
        for session in &evicted {
            self.staging.clear(*session);
            self.credentials.remove(*session);
        }

        // Keys of sessions that never connected age out on their own.
        let stale = self
            .credentials
            .remove_stale(ttl, |session| self.registry.contains(session));
        for session in stale {
            self.staging.clear(session);
            evicted.push(session);
        }
        evicted
    }

    /// Runs `evict_idle` every `every` until the gateway is dropped.
    pub fn spawn_idle_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let gateway = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(gateway) = gateway.upgrade() else {
                    break;
                };
                let evicted = gateway.evict_idle().await;
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "idle sessions reaped");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> ConnectRequest {
        ConnectRequest {
            connection_string: None,
            db_type: Some("postgresql".into()),
            host: Some("localhost".into()),
            port: Some("5432".into()),
            user: Some("postgres".into()),
            password: Some("pw".into()),
            database: Some("school".into()),
        }
    }

    #[test]
    fn complete_parts_become_params() {
        let target = parts().into_target().unwrap();
        assert_eq!(
            target.to_url().unwrap(),
            "postgresql://postgres:pw@localhost:5432/school"
        );
    }

    #[test]
    fn missing_parts_are_named() {
        let request = ConnectRequest {
            host: None,
            password: Some("  ".into()),
            ..parts()
        };
        match request.into_target() {
            Err(GatewayError::MissingFields(fields)) => assert_eq!(fields, "host, password"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn connection_string_wins_over_parts() {
        let request = ConnectRequest {
            connection_string: Some("sqlite::memory:".into()),
            ..parts()
        };
        assert!(matches!(
            request.into_target().unwrap(),
            ConnectionTarget::Url(url) if url == "sqlite::memory:"
        ));
    }

    #[test]
    fn payload_deserializes_from_json() {
        let request: ConnectRequest = serde_json::from_str(
            r#"{"db_type":"mysql","host":"h","port":"3306","user":"u","password":"p","database":"d"}"#,
        )
        .unwrap();
        assert!(request.into_target().is_ok());
    }

    #[test]
    fn client_settings_come_from_config() {
        let config = GatewayConfig {
            llm_max_tokens: 256,
            ..GatewayConfig::default()
        };
        let gateway = Gateway::with_llm_client(config);
        assert_eq!(gateway.config().llm_max_tokens, 256);
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let gateway = Gateway::with_llm_client(GatewayConfig::default());
        let session = gateway.open_session();
        assert!(matches!(
            gateway.set_credential(session, "  "),
            Err(GatewayError::MissingCredential)
        ));
    }
}
