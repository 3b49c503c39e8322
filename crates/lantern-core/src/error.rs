// Error types for the event-delivery engine

use thiserror::Error;

use crate::event::EventId;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the event-delivery engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// An event id was announced that does not exist in the store.
    /// This is a producer bug (announce-before-persist), never absorbed silently.
    #[error("event {0} not found in store")]
    EventNotFound(EventId),

    /// Event store error
    #[error("store error: {0}")]
    Store(String),

    /// Secret store error
    #[error("secret store error: {0}")]
    SecretStore(String),

    /// Security violation (e.g. loosened secret-file permissions)
    #[error("security violation: {0}")]
    Security(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        EngineError::Store(msg.into())
    }

    /// Create a secret store error
    pub fn secret_store(msg: impl Into<String>) -> Self {
        EngineError::SecretStore(msg.into())
    }

    /// Create a security violation error
    pub fn security(msg: impl Into<String>) -> Self {
        EngineError::Security(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }
}
