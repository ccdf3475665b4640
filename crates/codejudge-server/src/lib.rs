//! HTTP front door for the codejudge sandbox
//!
//! Exposes `POST /submit/{language}` for running code, plus `/health` and
//! `/languages`. Request parsing and response shaping live here; everything
//! about running code is delegated to [`codejudge_core::Sandbox`].

pub mod error;

pub use error::{Result, ServerError};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use codejudge_core::recipes::supported_languages;
use codejudge_core::{BackendKind, ErrorKind, ExecutionReport, Language, Sandbox, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub backend: BackendKind,
}

/// Body of a submission request. The language in the URL path takes precedence
/// over the optional `language` field.
#[derive(Debug, Deserialize)]
pub struct CodeSubmission {
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Standard response for a submission.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Set when `output` was cut at the configured size cap.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl From<ExecutionReport> for SubmissionResponse {
    fn from(report: ExecutionReport) -> Self {
        Self {
            success: report.is_success(),
            error: report.error_message(),
            error_kind: report.error.as_ref().map(|e| e.kind()),
            truncated: report.truncated,
            output: report.output,
        }
    }
}

impl SubmissionResponse {
    /// A request refused before anything ran.
    pub fn rejected(err: &ServerError) -> Self {
        let (error, error_kind) = match err {
            ServerError::Sandbox(e) => (e.to_string(), Some(e.kind())),
            other => (other.to_string(), None),
        };
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            error_kind,
            truncated: false,
        }
    }
}

/// One row of the language table.
#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub language: Language,
    pub source_filename: &'static str,
    pub image: String,
    pub command: Vec<String>,
}

/// Supported languages with configuration overrides applied.
pub fn language_catalog(config: &SandboxConfig) -> Vec<LanguageInfo> {
    supported_languages()
        .map(|recipe| LanguageInfo {
            language: recipe.language,
            source_filename: recipe.source_filename,
            image: config.image_for(recipe),
            command: config.command_for(recipe),
        })
        .collect()
}

/// Configuration for the codejudge server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            cors_origins: None, // Allow any origin
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr.parse().map_err(|e| {
            ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e))
        })?;
        Ok(self)
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Set maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sandbox: Arc<Sandbox>,
}

fn status_of(err: &ServerError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Handler for the /submit/{language} POST endpoint.
///
/// The body is parsed as JSON whatever its `Content-Type`, so clients that
/// omit the header are still served.
async fn submit_handler(
    State(app_state): State<AppState>,
    Path(language): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<SubmissionResponse>) {
    log::info!("Request received for language: '{}'", language);

    if let Err(e) = language.parse::<Language>() {
        let err = ServerError::from(e);
        log::info!("Rejecting submission ({}): {}", err.error_type(), err);
        return (status_of(&err), Json(SubmissionResponse::rejected(&err)));
    }

    let submission = match serde_json::from_slice::<CodeSubmission>(&body) {
        Ok(submission) => submission,
        Err(e) => {
            let err = ServerError::invalid_request(e.to_string());
            log::info!("Rejecting submission ({}): {}", err.error_type(), err);
            return (status_of(&err), Json(SubmissionResponse::rejected(&err)));
        }
    };
    if let Some(body_language) = submission.language.as_deref() {
        if body_language != language {
            log::debug!(
                "Ignoring body language '{}' in favour of path language '{}'",
                body_language,
                language
            );
        }
    }

    let report = app_state.sandbox.execute(&language, &submission.code).await;
    if let Some(error) = &report.error {
        log::info!("Submission for {} failed ({:?})", language, error.kind());
    }
    (StatusCode::OK, Json(report.into()))
}

/// Handler for the /languages GET endpoint.
async fn languages_handler(State(app_state): State<AppState>) -> Json<Vec<LanguageInfo>> {
    Json(language_catalog(app_state.sandbox.config()))
}

/// Handler for the /health GET endpoint.
async fn health_handler(State(app_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: app_state.sandbox.backend_kind(),
    })
}

/// The codejudge HTTP server.
pub struct CodeJudgeServer {
    sandbox: Arc<Sandbox>,
    config: ServerConfig,
}

impl CodeJudgeServer {
    /// Create a new server with default configuration.
    pub fn new(sandbox: Sandbox) -> Self {
        Self::with_config(sandbox, ServerConfig::default())
    }

    /// Create a new server with custom configuration.
    pub fn with_config(sandbox: Sandbox, config: ServerConfig) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
            config,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            sandbox: self.sandbox.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/languages", get(languages_handler))
            .route("/submit/{language}", post(submit_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_size));

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async move {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::info!(
                        "Response {} {} completed in {:?}",
                        request_id,
                        response.status(),
                        start.elapsed()
                    );
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = match &self.config.cors_origins {
                Some(origins) => {
                    let parsed: std::result::Result<Vec<HeaderValue>, _> =
                        origins.iter().map(|s| s.parse()).collect();
                    match parsed {
                        Ok(origins) => CorsLayer::new()
                            .allow_origin(origins)
                            .allow_methods(Any)
                            .allow_headers(Any),
                        Err(_) => {
                            log::warn!("Invalid CORS origin configured, allowing any origin");
                            CorsLayer::permissive()
                        }
                    }
                }
                None => CorsLayer::permissive(),
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal is received.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "codejudge server starting on {} ({} backend)",
            self.config.bind_addr,
            self.sandbox.backend_kind()
        );
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!(
            "Submit endpoint: http://{}/submit/{{language}}",
            self.config.bind_addr
        );
        if !self.sandbox.backend_kind().is_isolated() {
            log::warn!("Submissions are NOT isolated on this server (NOT SECURE FOR PRODUCTION)");
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        log::info!("codejudge server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
