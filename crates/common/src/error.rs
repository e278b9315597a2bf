use thiserror::Error;

/// Common error types for the sync check service
#[derive(Error, Debug)]
pub enum SyncCheckError {
    /// The relay client could not produce a session for the pair
    #[error("Session not found for application {application} on chain {chain}: {reason}")]
    SessionNotFound {
        application: String,
        chain: String,
        reason: String,
    },

    /// Cache layer errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Network related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Cache instance errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache instance {instance} unavailable: {reason}")]
    Unavailable { instance: String, reason: String },

    #[error("Cache operation failed on {instance}: {reason}")]
    Operation { instance: String, reason: String },
}

/// Network specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SyncCheckError>;

impl From<serde_json::Error> for SyncCheckError {
    fn from(err: serde_json::Error) -> Self {
        SyncCheckError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SyncCheckError {
    fn from(err: config::ConfigError) -> Self {
        SyncCheckError::Config(format!("Configuration error: {}", err))
    }
}

impl SyncCheckError {
    /// Whether the failure is worth retrying on the next cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncCheckError::SessionNotFound { .. }
                | SyncCheckError::Cache(_)
                | SyncCheckError::Network(_)
        )
    }
}
