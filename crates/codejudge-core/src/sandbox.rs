//! Submission orchestration.
//!
//! [`Sandbox`] is the single entry point for running a submission. It owns the
//! backend chosen at startup and, per call, resolves the recipe, provisions a
//! [`Workspace`], writes the source, dispatches to the backend, and folds the
//! outcome into an [`ExecutionReport`].
//!
//! Backend selection happens once, in [`Sandbox::from_config`]. If the Docker
//! client cannot be built or the daemon does not answer, or the configuration
//! forces it, the sandbox degrades to [`LocalBackend`] for the rest of the
//! process lifetime. There is no later attempt to go back to isolation.

use crate::config::SandboxConfig;
use crate::errors::SandboxError;
use crate::executors::{
    BackendKind, BollardRuntime, DockerBackend, ExecutionBackend, ExecutionPlan, LocalBackend,
};
use crate::recipes::{self, Recipe};
use crate::workspace::Workspace;
use std::sync::Arc;

/// Outcome of one submission.
///
/// `output` is kept even when `error` is set: a program that printed before
/// failing still gets its stdout back.
#[derive(Debug)]
pub struct ExecutionReport {
    pub output: String,
    pub error: Option<SandboxError>,
    /// The program produced more output than the configured cap.
    pub truncated: bool,
}

impl ExecutionReport {
    pub fn success(output: String) -> Self {
        Self {
            output,
            error: None,
            truncated: false,
        }
    }

    pub fn failure(output: String, error: SandboxError) -> Self {
        Self {
            output,
            error: Some(error),
            truncated: false,
        }
    }

    pub fn with_truncation(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

impl From<SandboxError> for ExecutionReport {
    fn from(error: SandboxError) -> Self {
        Self::failure(String::new(), error)
    }
}

pub struct Sandbox {
    backend: Arc<dyn ExecutionBackend>,
    config: SandboxConfig,
}

impl Sandbox {
    /// Build a sandbox around an explicitly chosen backend.
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: SandboxConfig) -> Self {
        Self { backend, config }
    }

    /// Pick the backend once for the process: Docker when reachable and not
    /// overridden, otherwise the local fallback.
    pub async fn from_config(config: SandboxConfig) -> Result<Self, SandboxError> {
        config.validate()?;

        if config.force_local {
            log::warn!(
                "Local execution forced by configuration, submissions run unisolated on this host (NOT SECURE FOR PRODUCTION)"
            );
            return Ok(Self::new(Arc::new(LocalBackend::new()), config));
        }

        let runtime = match BollardRuntime::connect() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("{}", e);
                log::warn!("Falling back to local execution (NOT SECURE FOR PRODUCTION)");
                return Ok(Self::new(Arc::new(LocalBackend::new()), config));
            }
        };
        if !runtime.is_available().await {
            log::warn!("Docker daemon is not responding to ping");
            log::warn!("Falling back to local execution (NOT SECURE FOR PRODUCTION)");
            return Ok(Self::new(Arc::new(LocalBackend::new()), config));
        }

        log::info!("Docker is available, submissions run in isolated containers");
        let backend = DockerBackend::new(runtime, config.mount_path.clone())
            .with_image_pull(config.pull_missing_images);
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Image, command, limits and timeout for a recipe after overrides.
    pub fn plan_for(&self, recipe: &Recipe) -> ExecutionPlan {
        ExecutionPlan {
            language: recipe.language,
            image: self.config.image_for(recipe),
            command: self.config.command_for(recipe),
            limits: self.config.limits_for(recipe.language),
            timeout: self.config.timeout_for(recipe.language),
            output_limit: self.config.max_output_bytes,
        }
    }

    /// Run `source_code` as `language_id`.
    pub async fn execute(&self, language_id: &str, source_code: &str) -> ExecutionReport {
        let recipe = match recipes::resolve(language_id) {
            Ok(recipe) => recipe,
            Err(e) => {
                log::info!("Rejected submission: {}", e);
                return e.into();
            }
        };

        // Dropped on every path out of this function, which removes the directory.
        let workspace = match Workspace::create(
            &self.config.workspace_prefix,
            self.config.workspace_root.as_deref(),
        ) {
            Ok(workspace) => workspace,
            Err(e) => {
                log::error!("{}", e);
                return e.into();
            }
        };

        if let Err(e) = workspace
            .write_source(recipe.source_filename, source_code)
            .await
        {
            log::error!("{}", e);
            return e.into();
        }

        let plan = self.plan_for(recipe);
        log::info!(
            "Executing {} submission with {} backend",
            recipe.language,
            self.backend.kind()
        );

        match self.backend.run(workspace.root(), &plan).await {
            Ok(result) => {
                let truncated = result.truncated;
                if truncated {
                    log::warn!(
                        "Output of {} submission truncated at {} bytes",
                        recipe.language,
                        plan.output_limit
                    );
                }
                let report = match result.failure_detail() {
                    None => ExecutionReport::success(result.stdout),
                    Some(detail) => {
                        log::debug!("{} submission failed: {}", recipe.language, detail);
                        ExecutionReport::failure(
                            result.stdout,
                            SandboxError::UserCode {
                                detail,
                                exit_code: result.exit_code,
                            },
                        )
                    }
                };
                report.with_truncation(truncated)
            }
            Err(e) => {
                if e.is_infrastructure() {
                    log::error!("Sandbox failure for {} submission: {}", recipe.language, e);
                }
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::executors::ExecutionResult;
    use crate::recipes::Language;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Backend that returns a canned result and records what it saw.
    struct FakeBackend {
        result: Mutex<Option<Result<ExecutionResult, SandboxError>>>,
        seen: Mutex<Vec<(PathBuf, String, ExecutionPlan)>>,
    }

    impl FakeBackend {
        fn returning(result: Result<ExecutionResult, SandboxError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ExecutionBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Docker
        }

        async fn run(
            &self,
            workspace: &Path,
            plan: &ExecutionPlan,
        ) -> Result<ExecutionResult, SandboxError> {
            let recipe = plan.language.recipe();
            let source = std::fs::read_to_string(workspace.join(recipe.source_filename))
                .unwrap_or_default();
            self.seen
                .lock()
                .unwrap()
                .push((workspace.to_path_buf(), source, plan.clone()));
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(ExecutionResult::default()))
        }
    }

    fn config_in(dir: &Path) -> SandboxConfig {
        SandboxConfig {
            workspace_root: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    fn ok(stdout: &str) -> Result<ExecutionResult, SandboxError> {
        Ok(ExecutionResult {
            stdout: stdout.to_string(),
            exit_code: Some(0),
            ..Default::default()
        })
    }

    fn leftover_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_success_returns_stdout_and_cleans_up() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(ok("hello\n"));
        let sandbox = Sandbox::new(backend.clone(), config_in(root.path()));

        let report = sandbox.execute("python", "print('hello')").await;

        assert!(report.is_success());
        assert_eq!(report.output, "hello\n");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].1, "print('hello')");
        assert_eq!(seen[0].2.image, "python:3.9-slim");
        assert!(!seen[0].0.exists());
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_unsupported_language_touches_nothing() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(ok("never"));
        let sandbox = Sandbox::new(backend.clone(), config_in(root.path()));

        for language in ["ruby", "", "PYTHON", "rust"] {
            let report = sandbox.execute(language, "puts 1").await;
            assert!(!report.is_success());
            assert_eq!(report.output, "");
            assert_eq!(
                report.error.as_ref().map(|e| e.kind()),
                Some(ErrorKind::UnsupportedLanguage)
            );
        }

        let report = sandbox.execute("ruby", "puts 1").await;
        assert_eq!(
            report.error_message().unwrap(),
            "Unsupported language: 'ruby'"
        );
        assert_eq!(backend.calls(), 0);
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_stderr_fails_but_keeps_partial_output() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(Ok(ExecutionResult {
            stdout: "before crash\n".to_string(),
            stderr: "Traceback: boom\n".to_string(),
            exit_code: Some(1),
            oom_killed: false,
            truncated: false,
        }));
        let sandbox = Sandbox::new(backend, config_in(root.path()));

        let report = sandbox.execute("python", "print('before crash'); 1/0").await;

        assert!(!report.is_success());
        assert_eq!(report.output, "before crash\n");
        assert_eq!(report.error_message().unwrap(), "Traceback: boom\n");
        assert!(matches!(
            report.error,
            Some(SandboxError::UserCode {
                exit_code: Some(1),
                ..
            })
        ));
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_truncated_output_is_flagged_and_limit_planned() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(Ok(ExecutionResult {
            stdout: "y\n".repeat(8),
            exit_code: Some(0),
            truncated: true,
            ..Default::default()
        }));
        let mut config = config_in(root.path());
        config.max_output_bytes = 16;
        let sandbox = Sandbox::new(backend.clone(), config);

        let report = sandbox.execute("python", "while True: print('y')").await;

        assert!(report.is_success());
        assert!(report.truncated);
        assert_eq!(report.output.len(), 16);
        assert_eq!(backend.seen.lock().unwrap()[0].2.output_limit, 16);
    }

    #[tokio::test]
    async fn test_backend_failure_still_removes_workspace() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(Err(SandboxError::provisioning(
            "gcc:latest",
            "No such image",
        )));
        let sandbox = Sandbox::new(backend, config_in(root.path()));

        let report = sandbox.execute("c", "int main(void){return 0;}").await;

        assert_eq!(
            report.error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::Provisioning)
        );
        assert!(report.error.unwrap().is_infrastructure());
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_workspace_creation_failure_skips_execution() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(ok("never"));
        let sandbox = Sandbox::new(backend.clone(), config_in(&root.path().join("missing")));

        let report = sandbox.execute("javascript", "console.log(1)").await;

        assert_eq!(
            report.error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::Workspace)
        );
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_each_submission_gets_its_own_workspace() {
        let root = tempdir().unwrap();
        let backend = FakeBackend::returning(ok(""));
        let sandbox = Sandbox::new(backend.clone(), config_in(root.path()));

        let first = sandbox.execute("cpp", "int main(){}").await;
        let second = sandbox.execute("cpp", "int main(){}").await;

        assert!(first.is_success());
        assert!(second.is_success());
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].0, seen[1].0);
        assert_eq!(seen[0].1, "int main(){}");
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_plan_applies_language_overrides() {
        let root = tempdir().unwrap();
        let mut config = config_in(root.path());
        config.languages.insert(
            Language::Java,
            crate::config::LanguageOverride {
                image: Some("eclipse-temurin:17".to_string()),
                timeout_secs: Some(30),
                ..Default::default()
            },
        );
        let sandbox = Sandbox::new(FakeBackend::returning(ok("")), config);

        let plan = sandbox.plan_for(Language::Java.recipe());
        assert_eq!(plan.image, "eclipse-temurin:17");
        assert_eq!(plan.timeout, std::time::Duration::from_secs(30));
        assert_eq!(plan.command, Language::Java.recipe().command_vec());

        let plan = sandbox.plan_for(Language::C.recipe());
        assert_eq!(plan.image, "gcc:latest");
        assert_eq!(plan.timeout, std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_forced_local_selects_local_backend() {
        let config = SandboxConfig {
            force_local: true,
            ..Default::default()
        };
        let sandbox = Sandbox::from_config(config).await.unwrap();
        assert_eq!(sandbox.backend_kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_local_backend_end_to_end_with_shell_override() {
        let root = tempdir().unwrap();
        let mut config = config_in(root.path());
        config.force_local = true;
        config.languages.insert(
            Language::Python,
            crate::config::LanguageOverride {
                command: Some(vec!["cat".to_string(), "code.py".to_string()]),
                ..Default::default()
            },
        );
        let sandbox = Sandbox::from_config(config).await.unwrap();

        let report = sandbox.execute("python", "ok").await;

        assert!(report.is_success());
        assert_eq!(report.output, "ok");
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    #[ignore] // Requires `python` on PATH
    async fn test_local_python_hello() {
        let root = tempdir().unwrap();
        let mut config = config_in(root.path());
        config.force_local = true;
        let sandbox = Sandbox::from_config(config).await.unwrap();

        let report = sandbox.execute("python", "print('hello')").await;
        assert!(report.is_success());
        assert_eq!(report.output, "hello\n");
    }
}
