//! Sandbox configuration types

use crate::errors::SandboxError;
use crate::recipes::{Language, Recipe};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const MIB: i64 = 1024 * 1024;

/// Smallest memory ceiling the container runtime accepts.
const MIN_MEMORY_BYTES: i64 = 6 * MIB;

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Skip isolation entirely and run submissions on the host.
    pub force_local: bool,
    pub timeout_secs: u64,
    /// Where the workspace is mounted inside the isolated unit.
    pub mount_path: String,
    pub workspace_prefix: String,
    /// Parent directory for workspaces; the system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
    pub pull_missing_images: bool,
    /// Cap on captured stdout plus stderr per run; the rest is discarded.
    pub max_output_bytes: usize,
    pub limits: ResourceLimits,
    pub languages: HashMap<Language, LanguageOverride>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            force_local: false,
            timeout_secs: 10,
            mount_path: "/code".to_string(),
            workspace_prefix: "code-execution".to_string(),
            workspace_root: None,
            pull_missing_images: false,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            limits: ResourceLimits::default(),
            languages: HashMap::new(),
        }
    }
}

/// Resource ceilings applied to every isolated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub pids_limit: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 100 * MIB,
            cpu_period: 100_000,
            cpu_quota: 50_000,
            pids_limit: 100,
        }
    }
}

impl ResourceLimits {
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.memory_bytes < MIN_MEMORY_BYTES {
            return Err(SandboxError::Config(format!(
                "memory_bytes must be at least {} (got {})",
                MIN_MEMORY_BYTES, self.memory_bytes
            )));
        }
        if !(1_000..=1_000_000).contains(&self.cpu_period) {
            return Err(SandboxError::Config(format!(
                "cpu_period must be between 1000 and 1000000 microseconds (got {})",
                self.cpu_period
            )));
        }
        if self.cpu_quota < 1_000 {
            return Err(SandboxError::Config(format!(
                "cpu_quota must be at least 1000 microseconds (got {})",
                self.cpu_quota
            )));
        }
        if self.pids_limit <= 0 {
            return Err(SandboxError::Config(format!(
                "pids_limit must be positive (got {})",
                self.pids_limit
            )));
        }
        Ok(())
    }
}

/// Per-language adjustments layered over a recipe and the global limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageOverride {
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
    pub limits: Option<ResourceLimits>,
    pub timeout_secs: Option<u64>,
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn image_for(&self, recipe: &Recipe) -> String {
        self.languages
            .get(&recipe.language)
            .and_then(|o| o.image.clone())
            .unwrap_or_else(|| recipe.runtime_image.to_string())
    }

    pub fn command_for(&self, recipe: &Recipe) -> Vec<String> {
        self.languages
            .get(&recipe.language)
            .and_then(|o| o.command.clone())
            .unwrap_or_else(|| recipe.command_vec())
    }

    pub fn limits_for(&self, language: Language) -> ResourceLimits {
        self.languages
            .get(&language)
            .and_then(|o| o.limits)
            .unwrap_or(self.limits)
    }

    pub fn timeout_for(&self, language: Language) -> Duration {
        self.languages
            .get(&language)
            .and_then(|o| o.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.timeout())
    }

    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.timeout_secs == 0 {
            return Err(SandboxError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.mount_path.starts_with('/') {
            return Err(SandboxError::Config(format!(
                "mount_path must be absolute (got '{}')",
                self.mount_path
            )));
        }
        if self.workspace_prefix.is_empty() || self.workspace_prefix.contains('/') {
            return Err(SandboxError::Config(format!(
                "workspace_prefix must be a non-empty file name (got '{}')",
                self.workspace_prefix
            )));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::Config(
                "max_output_bytes must be greater than zero".to_string(),
            ));
        }
        self.limits.validate()?;

        for (language, lang_override) in &self.languages {
            if let Some(limits) = &lang_override.limits {
                limits.validate().map_err(|e| {
                    SandboxError::Config(format!("languages.{}: {}", language, e))
                })?;
            }
            if lang_override.timeout_secs == Some(0) {
                return Err(SandboxError::Config(format!(
                    "languages.{}: timeout_secs must be greater than zero",
                    language
                )));
            }
            if matches!(&lang_override.command, Some(command) if command.is_empty()) {
                return Err(SandboxError::Config(format!(
                    "languages.{}: command must not be empty",
                    language
                )));
            }
        }
        Ok(())
    }
}
