//! Error types for the notifier.
//!
//! Startup failures (configuration, credentials) are fatal to the process.
//! Remote query failures are carried as [`SourceError`] and never escape the
//! planner: they feed the retry controller instead.

use thiserror::Error;

/// Failure reported by an event source for a single query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The remote request failed or returned an error status
    #[error("request failed: {0}")]
    Request(String),

    /// The client could not be constructed
    #[error("client setup failed: {0}")]
    Build(String),
}

impl SourceError {
    pub fn request(message: impl Into<String>) -> Self {
        SourceError::Request(message.into())
    }
}

/// Unified error type for the notifier library
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Invalid or missing configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential file could not be loaded
    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Event source failure surfaced outside the planning loop
    #[error("Event source error: {0}")]
    Source(#[from] SourceError),

    /// The planner task stopped receiving commands
    #[error("Planner command channel closed")]
    ChannelClosed,
}

impl NotifierError {
    /// Create a config error for a malformed environment override
    pub fn invalid_env(var_name: &str, value: &str) -> Self {
        NotifierError::Config(format!("{} has invalid value '{}'", var_name, value))
    }
}

/// Result type alias for notifier operations
pub type NotifierResult<T> = Result<T, NotifierError>;
