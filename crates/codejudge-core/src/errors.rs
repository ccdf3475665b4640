//! Error types for sandboxed execution
//!
//! Every failure a submission can hit is one variant of [`SandboxError`]. The
//! variants are split by *who* is at fault: the submitted program
//! ([`SandboxError::UserCode`]) versus the sandbox infrastructure (workspace,
//! provisioning, transport, output capture, timeout). Callers use
//! [`SandboxError::kind`] to report the distinction without parsing messages.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Unsupported language: '{0}'")]
    UnsupportedLanguage(String),
    #[error("Workspace error: failed to {action}: {source}")]
    Workspace {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to provision sandbox from image '{image}': {message}")]
    Provisioning { image: String, message: String },
    #[error("Sandbox transport error: {0}")]
    ExecutionTransport(String),
    #[error("Failed to capture sandbox output: {0}")]
    OutputCapture(String),
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),
    /// The submitted program failed. The display form is the program's own
    /// stderr (or a short exit description) so it can be shown verbatim.
    #[error("{detail}")]
    UserCode {
        detail: String,
        exit_code: Option<i64>,
    },
    #[error("Cleanup failed: {0}")]
    Cleanup(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`SandboxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedLanguage,
    Workspace,
    Provisioning,
    ExecutionTransport,
    OutputCapture,
    Timeout,
    UserCodeFailure,
    Cleanup,
    Configuration,
}

impl SandboxError {
    pub fn workspace(action: &'static str, source: std::io::Error) -> Self {
        SandboxError::Workspace { action, source }
    }

    pub fn provisioning(image: impl Into<String>, message: impl ToString) -> Self {
        SandboxError::Provisioning {
            image: image.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            SandboxError::Workspace { .. } => ErrorKind::Workspace,
            SandboxError::Provisioning { .. } => ErrorKind::Provisioning,
            SandboxError::ExecutionTransport(_) => ErrorKind::ExecutionTransport,
            SandboxError::OutputCapture(_) => ErrorKind::OutputCapture,
            SandboxError::Timeout(_) => ErrorKind::Timeout,
            SandboxError::UserCode { .. } => ErrorKind::UserCodeFailure,
            SandboxError::Cleanup(_) => ErrorKind::Cleanup,
            SandboxError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// True when the sandbox itself failed rather than the submitted code.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            SandboxError::UserCode { .. }
                | SandboxError::UnsupportedLanguage(_)
                | SandboxError::Timeout(_)
        )
    }
}
