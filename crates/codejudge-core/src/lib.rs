//! Sandboxed execution of untrusted source code.
//!
//! This crate takes a submission (a language identifier and source text), runs
//! it in an isolated, resource-bounded environment and returns what it printed.
//!
//! # Architecture Overview
//!
//! - **Recipes**: a closed table from language id to source file, image and command
//! - **Workspaces**: one scoped temporary directory per submission, always removed
//! - **Isolated backend**: Docker containers with no network and memory, CPU and
//!   process ceilings, removed after every run
//! - **Local backend**: an insecure host-process fallback for development
//! - **Orchestration**: backend selection at startup and a single
//!   `(output, error)` result per submission

pub mod config;
pub mod errors;
pub mod executors;
pub mod recipes;
pub mod sandbox;
pub mod workspace;

pub use config::{ConfigLoader, ResourceLimits, SandboxConfig};
pub use errors::{ErrorKind, SandboxError};
pub use executors::{BackendKind, ExecutionBackend, ExecutionPlan, ExecutionResult};
pub use recipes::{Language, Recipe};
pub use sandbox::{ExecutionReport, Sandbox};
pub use workspace::Workspace;
