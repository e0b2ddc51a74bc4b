pub mod config;
pub mod connection_url;
pub mod db;
pub mod error;
pub mod gateway;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod session;
pub mod staging;
pub mod statement;

pub use config::GatewayConfig;
pub use connection_url::{build_connection_url, ConnectionParams, ConnectionTarget, Dialect};
pub use db::{ConnectionHandle, QueryOutput, Row, SchemaDescription};
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{ConnectRequest, Gateway};
pub use intent::{Intent, SmallTalk};
pub use llm::{LlmClient, Prompt, PromptPurpose, TextGenerator};
pub use pipeline::{ExecutionReport, GenerateOutcome, QueryPipeline};
pub use registry::ConnectionRegistry;
pub use session::{CredentialStore, SessionId};
pub use staging::{PendingQuery, QueryStagingStore};
pub use statement::StatementKind;
