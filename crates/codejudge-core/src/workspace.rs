//! Per-submission scratch directories.
//!
//! A [`Workspace`] owns a freshly created, uniquely named temporary directory
//! for exactly one execution. The directory is removed when the value is
//! dropped, whichever way the execution ended. Removal failures are logged and
//! otherwise ignored so they never replace the execution outcome.

use crate::errors::SandboxError;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};

#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
}

impl Workspace {
    /// Create a workspace under `parent`, or under the system temp dir.
    pub fn create(prefix: &str, parent: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = Builder::new();
        builder.prefix(prefix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| SandboxError::workspace("create temporary directory", e))?;

        // The container user is not necessarily the host user; compilers need
        // to write their artifacts next to the source.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))
                .map_err(|e| SandboxError::workspace("set workspace permissions", e))?;
        }

        let root = dir.path().to_path_buf();
        log::debug!("Created workspace {}", root.display());
        Ok(Self {
            dir: Some(dir),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `source` verbatim to `filename` inside the workspace.
    pub async fn write_source(&self, filename: &str, source: &str) -> Result<PathBuf, SandboxError> {
        let path = self.root.join(filename);
        tokio::fs::write(&path, source.as_bytes())
            .await
            .map_err(|e| SandboxError::workspace("write source file", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(|e| SandboxError::workspace("set source file permissions", e))?;
        }

        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => log::debug!("Removed workspace {}", self.root.display()),
                Err(e) => log::warn!(
                    "Failed to remove workspace {}: {}",
                    self.root.display(),
                    e
                ),
            }
        }
    }
}
