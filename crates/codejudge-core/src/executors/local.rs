//! Local (non-isolated) execution backend.
//
// Runs the plan's command directly on the host with the workspace as working
// directory. There is no isolation, no resource ceiling and no network
// restriction: this exists so the service stays usable on machines without a
// container engine, and must never be used to run untrusted code.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::demux::{CapturedOutput, LogFrame, StreamKind};
use super::{BackendKind, ExecutionBackend, ExecutionPlan, ExecutionResult};
use crate::errors::SandboxError;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Default, Clone)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn run(
        &self,
        workspace: &Path,
        plan: &ExecutionPlan,
    ) -> Result<ExecutionResult, SandboxError> {
        let (program, args) = plan.command.split_first().ok_or_else(|| {
            SandboxError::Config(format!("empty command for language {}", plan.language))
        })?;
        log::warn!(
            "Executing locally (NOT SECURE FOR PRODUCTION): {:?}",
            plan.command
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            SandboxError::ExecutionTransport(format!("Failed to spawn '{}': {}", program, e))
        })?;
        // Kills whatever the shell forked on every way out of this function,
        // cancellation included.
        let _group = ProcessGroupGuard::new(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let output_limit = plan.output_limit;
        let execution = async move {
            let output = read_combined(stdout, stderr, output_limit).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((output, status))
        };

        // Dropping `execution` on timeout drops the child, which kills it.
        let (output, status) = match tokio::time::timeout(plan.timeout, execution).await {
            Ok(result) => result.map_err(|e| {
                SandboxError::ExecutionTransport(format!("Local execution failed: {}", e))
            })?,
            Err(_) => {
                log::warn!("Local execution timed out after {:?}", plan.timeout);
                return Err(SandboxError::Timeout(plan.timeout));
            }
        };

        let exit_code = match status.code() {
            Some(code) => i64::from(code),
            // terminated by a signal
            None => -1,
        };
        let mut result = ExecutionResult {
            stdout: output.stdout_text(),
            stderr: String::new(),
            exit_code: Some(exit_code),
            oom_killed: false,
            truncated: output.truncated,
        };
        if exit_code != 0 {
            // Combined output cannot tell stderr apart; describe the failure instead.
            result.stderr = format!("execution error: {}", status);
        }
        Ok(result)
    }
}

/// SIGKILLs the child's whole process group when dropped.
struct ProcessGroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|id| libc::pid_t::try_from(id).ok()) {
            // SAFETY: killpg only delivers a signal. An empty group yields ESRCH,
            // which is the normal outcome once everything has exited.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                log::debug!("Killed leftover processes in group {}", pgid);
            }
        }
    }
}

/// Aborts the pipe readers when collection finishes or is abandoned.
struct ReaderTasks(Vec<JoinHandle<()>>);

impl Drop for ReaderTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Read both pipes until EOF, keeping chunks in arrival order up to `limit`
/// bytes. Past the limit the pipes are still drained so the program is not
/// blocked on a full pipe.
async fn read_combined<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    limit: usize,
) -> std::io::Result<CapturedOutput>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(16);
    let mut readers = ReaderTasks(Vec::with_capacity(2));
    if let Some(stdout) = stdout {
        readers.0.push(tokio::spawn(forward_chunks(stdout, tx.clone())));
    }
    if let Some(stderr) = stderr {
        readers.0.push(tokio::spawn(forward_chunks(stderr, tx.clone())));
    }
    drop(tx);

    let mut output = CapturedOutput::with_limit(limit);
    while let Some(chunk) = rx.recv().await {
        output.push(&LogFrame::new(StreamKind::Stdout, chunk?));
    }
    Ok(output)
}

async fn forward_chunks<R>(mut reader: R, tx: mpsc::Sender<std::io::Result<Bytes>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
