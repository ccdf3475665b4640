// src/executors/container.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    InspectContainerOptions as BollardInspectContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::PathBuf;

use super::demux::{CapturedOutput, LogFrame, StreamKind};
use crate::config::ResourceLimits;
use crate::errors::SandboxError;

/// Description of one isolated execution unit.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    /// Host directory bind-mounted read/write at `mount_path`.
    pub host_workspace: PathBuf,
    pub mount_path: String,
    pub limits: ResourceLimits,
}

/// Terminal state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
    pub oom_killed: bool,
}

/// The operations the isolated backend needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Pull `image` if it is not present locally.
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError>;
    async fn create(&self, spec: &ContainerSpec) -> Result<String, SandboxError>;
    async fn start(&self, id: &str) -> Result<(), SandboxError>;
    /// Block until the unit is no longer running.
    async fn wait(&self, id: &str) -> Result<ExitStatus, SandboxError>;
    /// Collect stdout and stderr, keeping at most `limit` bytes.
    async fn logs(&self, id: &str, limit: usize) -> Result<CapturedOutput, SandboxError>;
    /// Force-remove the unit, killing it if still running.
    async fn remove(&self, id: &str) -> Result<(), SandboxError>;
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    pub fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::ExecutionTransport(format!("Failed to connect to Docker: {}", e))
        })?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    async fn oom_killed(&self, id: &str) -> bool {
        match self
            .docker
            .inspect_container(id, None::<BollardInspectContainerOptionsQuery>)
            .await
        {
            Ok(details) => details
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                log::debug!("Could not inspect container {}: {}", id, e);
                false
            }
        }
    }
}

/// Translate a [`ContainerSpec`] into the Engine API create body.
pub fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let limits = &spec.limits;
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        working_dir: Some(spec.mount_path.clone()),
        network_disabled: Some(true),
        tty: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        host_config: Some(HostConfig {
            binds: Some(vec![format!(
                "{}:{}:rw",
                spec.host_workspace.display(),
                spec.mount_path
            )]),
            network_mode: Some("none".to_string()),
            memory: Some(limits.memory_bytes),
            // no swap beyond the memory ceiling
            memory_swap: Some(limits.memory_bytes),
            cpu_period: Some(limits.cpu_period),
            cpu_quota: Some(limits.cpu_quota),
            pids_limit: Some(limits.pids_limit),
            oom_kill_disable: Some(false),
            auto_remove: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        log::info!("Pulling image {}", image);
        let mut pull_stream = self.docker.create_image(
            Some(BollardCreateImageOptionsQuery {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull_stream.next().await {
            match progress {
                Ok(info) => log::debug!("Pulling image {}: {:?}", image, info.status),
                Err(e) => return Err(SandboxError::provisioning(image, e)),
            }
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });
        let response = self
            .docker
            .create_container(options, container_body(spec))
            .await
            .map_err(|e| SandboxError::provisioning(&spec.image, e))?;

        for warning in &response.warnings {
            log::warn!("Docker warning for container {}: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(|e| {
                SandboxError::ExecutionTransport(format!(
                    "Failed to start container {}: {}",
                    id, e
                ))
            })
    }

    async fn wait(&self, id: &str) -> Result<ExitStatus, SandboxError> {
        let mut wait_stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);

        let code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => {
                return Err(SandboxError::ExecutionTransport(format!(
                    "Container wait error: {}",
                    e
                )))
            }
            None => {
                return Err(SandboxError::ExecutionTransport(
                    "Container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let oom_killed = self.oom_killed(id).await;
        Ok(ExitStatus { code, oom_killed })
    }

    async fn logs(&self, id: &str, limit: usize) -> Result<CapturedOutput, SandboxError> {
        let mut output_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut output = CapturedOutput::with_limit(limit);
        while let Some(log_result) = output_stream.next().await {
            let frame = match log_result {
                Ok(LogOutput::StdOut { message }) => LogFrame::new(StreamKind::Stdout, message),
                Ok(LogOutput::StdErr { message }) => LogFrame::new(StreamKind::Stderr, message),
                Ok(LogOutput::StdIn { message }) => LogFrame::new(StreamKind::Stdin, message),
                // Only produced for TTY containers, which are never created here.
                Ok(LogOutput::Console { message }) => LogFrame::new(StreamKind::Stdout, message),
                Err(e) => {
                    return Err(SandboxError::OutputCapture(format!(
                        "Failed to read logs of container {}: {}",
                        id, e
                    )))
                }
            };
            output.push(&frame);
            if output.truncated {
                // the rest would be discarded anyway
                break;
            }
        }
        Ok(output)
    }

    async fn remove(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .remove_container(
                id,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SandboxError::Cleanup(format!("Failed to remove container {}: {}", id, e)))
    }
}
