//! Error types for the ModelDesk host.

use common::ChatError;
use modeldesk_model_cache::CatalogError;
use thiserror::Error;

/// Result type for host operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0:#}")]
    Config(anyhow::Error),

    /// Model catalog failed validation
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Chat turn failed
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Chat turn exceeded the caller-side timeout
    #[error("Chat turn timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Credential storage failed
    #[error("Token storage error: {0:#}")]
    Auth(anyhow::Error),

    /// Invalid command input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServerError {
    /// Process exit code: 2 for usage problems, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::Config(_) | ServerError::InvalidInput(_) => 2,
            ServerError::Chat(ChatError::UnknownModel(_)) => 2,
            _ => 1,
        }
    }
}
