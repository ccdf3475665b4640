//! Error types for the codejudge server.

use codejudge_core::SandboxError;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the codejudge server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Sandbox setup failed
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request format
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// Create a new invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Convert ServerError to HTTP status code
impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::Sandbox(SandboxError::UnsupportedLanguage(_)) => 400,
            ServerError::Sandbox(_)
            | ServerError::Io(_)
            | ServerError::Config(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Sandbox(_) => "sandbox_error",
            ServerError::Io(_) => "io_error",
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Config(_) => "config_error",
        }
    }
}
