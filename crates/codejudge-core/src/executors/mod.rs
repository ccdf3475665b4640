//! Code execution backends.
//!
//! A backend takes a prepared workspace and an [`ExecutionPlan`] and runs the
//! plan's command with the workspace as working directory. Two backends exist:
//! the isolated Docker backend, and an insecure local fallback used only when
//! isolation is unavailable or explicitly disabled.

use crate::config::ResourceLimits;
use crate::errors::SandboxError;
use crate::recipes::Language;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub mod container;
pub mod demux;
pub mod docker;
pub mod local;

#[cfg(test)]
mod isolation_test;

pub use container::{BollardRuntime, ContainerRuntime, ContainerSpec, ExitStatus};
pub use docker::DockerBackend;
pub use local::LocalBackend;

/// Everything a backend needs to run one submission.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub language: Language,
    /// Ignored by the local backend.
    pub image: String,
    pub command: Vec<String>,
    /// Ignored by the local backend.
    pub limits: ResourceLimits,
    pub timeout: Duration,
    /// Maximum bytes of output kept from the run.
    pub output_limit: usize,
}

/// What a backend observed. The local backend reports combined output as
/// `stdout` and leaves `stderr` empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub oom_killed: bool,
    /// Output went past the plan's limit and was cut.
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn failed(&self) -> bool {
        self.failure_detail().is_some()
    }

    /// Text describing why the program failed, or `None` on success.
    pub fn failure_detail(&self) -> Option<String> {
        if self.oom_killed {
            let mut detail = String::from("process was killed after exceeding the memory limit");
            if !self.stderr.is_empty() {
                detail.push('\n');
                detail.push_str(&self.stderr);
            }
            return Some(detail);
        }
        if !self.stderr.is_empty() {
            return Some(self.stderr.clone());
        }
        match self.exit_code {
            Some(0) | None => None,
            Some(code) => Some(format!("process exited with status {}", code)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Docker,
    Local,
}

impl BackendKind {
    pub fn is_isolated(&self) -> bool {
        matches!(self, BackendKind::Docker)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Docker => f.write_str("docker"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn run(
        &self,
        workspace: &Path,
        plan: &ExecutionPlan,
    ) -> Result<ExecutionResult, SandboxError>;
}
