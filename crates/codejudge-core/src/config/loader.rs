//! Configuration loader for YAML files and environment overrides
//!
//! Sources are layered: built-in defaults, then an optional YAML file, then
//! environment variables. The result is validated before it is handed out.

use super::types::SandboxConfig;
use crate::errors::SandboxError;
use std::env;
use std::path::Path;
use tokio::fs;

/// Forces the local (non-isolated) backend when set to `true`.
pub const SKIP_DOCKER_ENV: &str = "SKIP_DOCKER";
pub const TIMEOUT_ENV: &str = "CODEJUDGE_TIMEOUT_SECS";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file and apply environment overrides.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<SandboxConfig, SandboxError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            SandboxError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        log::debug!("Read sandbox configuration from {}", path.display());
        Self::from_str(&content)
    }

    /// Parse a YAML document and apply environment overrides.
    pub fn from_str(content: &str) -> Result<SandboxConfig, SandboxError> {
        let mut config: SandboxConfig = if content.trim().is_empty() {
            SandboxConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| SandboxError::Config(format!("Failed to parse YAML config: {}", e)))?
        };
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<SandboxConfig, SandboxError> {
        let mut config = SandboxConfig::default();
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(config: &mut SandboxConfig) -> Result<(), SandboxError> {
        if env::var(SKIP_DOCKER_ENV).map(|v| v == "true").unwrap_or(false) {
            log::info!("{} is set, local execution will be used", SKIP_DOCKER_ENV);
            config.force_local = true;
        }

        if let Ok(raw) = env::var(TIMEOUT_ENV) {
            config.timeout_secs = raw.trim().parse().map_err(|e| {
                SandboxError::Config(format!("Invalid {} value '{}': {}", TIMEOUT_ENV, raw, e))
            })?;
        }
        Ok(())
    }
}
