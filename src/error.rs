use thiserror::Error;

/// Whether a failure stems from the caller or from a dependency
/// (database, text-generation service).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Dependency,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Unsupported database type '{0}'. Use 'mysql' or 'postgresql'.")]
    UnsupportedDialect(String),

    #[error("Database not connected for this session. Connect a database first.")]
    NotConnected,

    #[error("No API key set for this session. Set an API key first.")]
    MissingCredential,

    #[error("Question is required")]
    MissingQuestion,

    #[error("No pending query for this session. Generate a query before executing it.")]
    NoPendingQuery,

    #[error("Failed to connect: {0}")]
    Connection(String),

    #[error("Schema introspection error: {0}")]
    Introspection(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::MissingFields(_)
            | GatewayError::UnsupportedDialect(_)
            | GatewayError::NotConnected
            | GatewayError::MissingCredential
            | GatewayError::MissingQuestion
            | GatewayError::NoPendingQuery => ErrorKind::Client,
            GatewayError::Connection(_)
            | GatewayError::Introspection(_)
            | GatewayError::Execution(_)
            | GatewayError::Llm(_)
            | GatewayError::Timeout(_)
            | GatewayError::Config(_)
            | GatewayError::Io(_)
            | GatewayError::Json(_) => ErrorKind::Dependency,
        }
    }

    /// HTTP-style status for transports that want one.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Client => 400,
            ErrorKind::Dependency => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
