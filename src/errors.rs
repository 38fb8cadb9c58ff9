//! Error types shared by the GGMP services.
//!
//! Every business-rule failure is a variant of [`ServiceError`]. The HTTP layer
//! (`server::api_error`) maps each variant onto a status code and the
//! `{ "success": false, "error": "..." }` body the game servers expect.

use thiserror::Error;

/// Errors produced by the keymaster, nucleus and policy services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required request field was absent or empty.
    #[error("Missing {0}")]
    MissingParameter(&'static str),

    /// The request body or one of its fields could not be understood.
    #[error("Invalid request: {0}")]
    InvalidParameter(String),

    /// The license key is not registered.
    #[error("Invalid license key")]
    InvalidKey,

    /// The license key is registered but its `expiresAt` lies in the past.
    #[error("License key has expired")]
    ExpiredKey,

    /// Revocation of a key that is not registered.
    #[error("Key not found")]
    KeyNotFound,

    /// No server is registered under the requested id.
    #[error("Server not found")]
    ServerNotFound,

    /// Reading or writing the key snapshot failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Talking to another GGMP service failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Anything else (lock poisoning, unexpected state).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Whether the failure is the server's fault rather than the caller's.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ServiceError::Storage(_)
                | ServiceError::Config(_)
                | ServiceError::Network(_)
                | ServiceError::Internal(_)
        )
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Network(err.to_string())
    }
}
