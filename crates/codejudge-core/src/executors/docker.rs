// src/executors/docker.rs
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::container::{BollardRuntime, ContainerRuntime, ContainerSpec};
use super::{BackendKind, ExecutionBackend, ExecutionPlan, ExecutionResult};
use crate::errors::SandboxError;

/// Isolated backend: one resource-capped, network-less container per run.
pub struct DockerBackend<R: ContainerRuntime = BollardRuntime> {
    runtime: Arc<R>,
    mount_path: String,
    pull_missing_images: bool,
}

impl<R: ContainerRuntime> DockerBackend<R> {
    pub fn new(runtime: R, mount_path: impl Into<String>) -> Self {
        Self {
            runtime: Arc::new(runtime),
            mount_path: mount_path.into(),
            pull_missing_images: false,
        }
    }

    pub fn with_image_pull(mut self, enabled: bool) -> Self {
        self.pull_missing_images = enabled;
        self
    }

    async fn run_container(
        &self,
        id: &str,
        plan: &ExecutionPlan,
    ) -> Result<ExecutionResult, SandboxError> {
        self.runtime.start(id).await?;

        let status = match tokio::time::timeout(plan.timeout, self.runtime.wait(id)).await {
            Ok(status) => status?,
            Err(_) => {
                log::warn!(
                    "Execution timed out after {:?} for container {}",
                    plan.timeout,
                    id
                );
                return Err(SandboxError::Timeout(plan.timeout));
            }
        };

        let output = self.runtime.logs(id, plan.output_limit).await?;

        Ok(ExecutionResult {
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            exit_code: Some(status.code),
            oom_killed: status.oom_killed,
            truncated: output.truncated,
        })
    }
}

#[async_trait]
impl<R: ContainerRuntime> ExecutionBackend for DockerBackend<R> {
    fn kind(&self) -> BackendKind {
        BackendKind::Docker
    }

    async fn run(
        &self,
        workspace: &Path,
        plan: &ExecutionPlan,
    ) -> Result<ExecutionResult, SandboxError> {
        if self.pull_missing_images {
            self.runtime.ensure_image(&plan.image).await?;
        }

        let spec = ContainerSpec {
            name: format!("code-exec-{}", Uuid::new_v4()),
            image: plan.image.clone(),
            command: plan.command.clone(),
            host_workspace: workspace.to_path_buf(),
            mount_path: self.mount_path.clone(),
            limits: plan.limits,
        };
        let id = self.runtime.create(&spec).await?;
        log::debug!("Created container {} ({}) from {}", spec.name, id, spec.image);

        let guard = ContainerGuard::new(self.runtime.clone(), id);
        let outcome = self.run_container(guard.id(), plan).await;
        guard.release().await;
        outcome
    }
}

/// Removes its container exactly once: through [`ContainerGuard::release`] on
/// every normal exit, or from `Drop` when the surrounding future is cancelled.
struct ContainerGuard<R: ContainerRuntime> {
    runtime: Arc<R>,
    id: Option<String>,
}

impl<R: ContainerRuntime> ContainerGuard<R> {
    fn new(runtime: Arc<R>, id: String) -> Self {
        Self {
            runtime,
            id: Some(id),
        }
    }

    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    async fn release(mut self) {
        if let Some(id) = self.id.take() {
            remove_logged(self.runtime.as_ref(), &id).await;
        }
    }
}

impl<R: ContainerRuntime> Drop for ContainerGuard<R> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Execution abandoned, removing container {} in background", id);
                let runtime = self.runtime.clone();
                handle.spawn(async move {
                    remove_logged(runtime.as_ref(), &id).await;
                });
            }
            Err(_) => log::error!("No async runtime available to remove container {}", id),
        }
    }
}

async fn remove_logged<R: ContainerRuntime>(runtime: &R, id: &str) {
    match runtime.remove(id).await {
        Ok(()) => log::debug!("Removed container {}", id),
        Err(e) => log::error!("{}", e),
    }
}
