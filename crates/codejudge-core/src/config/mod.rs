//! Configuration for the sandbox: resource ceilings, timeouts, workspace
//! placement, per-language overrides, and the local-execution override flag.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{LanguageOverride, ResourceLimits, SandboxConfig, MIB};

#[cfg(test)]
mod tests;
