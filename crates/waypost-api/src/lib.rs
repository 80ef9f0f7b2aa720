//! # Waypost HTTP Service
//!
//! HTTP server receiving geofence webhooks from the external location
//! provider and feeding them into the notification task queue.
//!
//! This service provides:
//! - The provider webhook endpoint with signature verification
//! - Health and readiness endpoints
//! - An admin endpoint listing permanently-failed tasks for replay
//!
//! The webhook path is the fast path: verify, normalize, enqueue, respond.
//! The actual notification side effect always happens asynchronously on the
//! queue's workers — a 200 response means "verified and enqueued", never
//! "business success".

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use task_runtime::{NotificationQueue, QueueError, TaskId};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument, warn};
use waypost_core::webhook::{
    EventNormalizer, SignatureVerifier, WebhookError, WebhookHeaders, WebhookRequest,
};
use waypost_core::{Timestamp, ValidationError};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Verifier for inbound webhook signatures
    pub verifier: Arc<dyn SignatureVerifier>,

    /// Normalizer mapping provider payload shapes to canonical events
    pub normalizer: EventNormalizer,

    /// Queue carrying accepted events to the notification workers
    pub queue: NotificationQueue,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        verifier: Arc<dyn SignatureVerifier>,
        queue: NotificationQueue,
    ) -> Self {
        Self {
            config,
            verifier,
            normalizer: EventNormalizer::new(),
            queue,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook intake settings
    pub webhook: WebhookConfig,

    /// Queue and worker settings
    pub queue: QueueSettings,

    /// Collaborator service endpoints
    pub collaborators: CollaboratorsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Validate configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first failure encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if self.webhook.secret.is_none() && !self.webhook.allow_unverified {
            return Err(ConfigError::Invalid {
                message: "webhook.secret is required unless webhook.allow_unverified is set"
                    .to_string(),
            });
        }

        if self.queue.workers == 0 {
            return Err(ConfigError::Invalid {
                message: "queue.workers must be at least 1".to_string(),
            });
        }

        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "queue.max_attempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: false,
            enable_compression: true,
        }
    }
}

/// Webhook intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,

    /// Shared secret used to verify provider signatures
    pub secret: Option<String>,

    /// Explicit non-production bypass of signature verification.
    ///
    /// Defaults to disabled; refusing to start without a secret is the
    /// safe failure mode.
    pub allow_unverified: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook".to_string(),
            secret: None,
            allow_unverified: false,
        }
    }
}

/// Queue and worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Queue lane name for this workload
    pub lane: String,

    /// Number of parallel notification workers
    pub workers: usize,

    /// Maximum delivery attempts per task
    pub max_attempts: u32,

    /// Fixed delay between attempts, in seconds
    pub backoff_seconds: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lane: "geofence".to_string(),
            workers: 4,
            max_attempts: 3,
            backoff_seconds: 30,
        }
    }
}

/// Collaborator service endpoints consumed by the notification processor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    /// Base URL of the entity directory service
    pub directory_url: Option<String>,

    /// Base URL of the notification delivery service
    pub notifier_url: Option<String>,

    /// Bearer token presented to both collaborators
    pub api_token: Option<String>,

    /// Timeout per collaborator call, in seconds
    pub timeout_seconds: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            directory_url: None,
            notifier_url: None,
            api_token: None,
            timeout_seconds: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors preventing startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes =
        Router::new().route(&state.config.webhook.endpoint_path, post(handle_webhook));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let admin_routes = Router::new().route("/admin/tasks/failed", get(list_failed_tasks));

    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Errors surfaced when the server itself cannot run
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("HTTP server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Start the HTTP server and serve until shutdown is signalled.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    state.config.validate()?;

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.to_string(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_timeout =
        std::time::Duration::from_secs(state.config.server.shutdown_timeout_seconds);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .map_err(|e| ServiceError::ServerFailed {
        message: e.to_string(),
    })?;

    // Let workers drain the lane before the process exits
    state.queue.shutdown().await;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Response body for an accepted webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// Events verified and enqueued for processing
    pub accepted: usize,
    /// Payload elements skipped as malformed
    pub parse_failures: usize,
    /// Task ids assigned to the accepted events, in payload order
    pub task_ids: Vec<TaskId>,
}

/// Handle a provider webhook delivery.
///
/// Fast path only: verify the signature over the raw bytes, normalize the
/// payload, enqueue each event, respond. The provider gets a 200 once
/// events are enqueued; processing failures are operator-visible through
/// the queue's failure records, never through this response.
#[instrument(skip(state, headers, body), fields(source = %source.0))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    source: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookHandlerError> {
    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();

    let webhook_headers = WebhookHeaders::from_http_headers(&header_map)
        .map_err(WebhookHandlerError::InvalidHeaders)?;

    let request = WebhookRequest::new(webhook_headers, body);

    // Reject unauthenticated payloads before touching their contents.
    // Log source and size only — never the payload or the signature.
    if let Err(error) = state.verifier.check(&request) {
        warn!(
            source = %source.0,
            payload_bytes = request.body.len(),
            reason = %error,
            "Rejected webhook delivery"
        );
        return Err(WebhookHandlerError::Unauthorized(error));
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&request.body).map_err(WebhookHandlerError::MalformedJson)?;

    let batch = state.normalizer.normalize(&payload, request.received_at);

    for failure in &batch.failures {
        warn!(
            correlation_id = %request.correlation_id,
            element = failure.index,
            reason = %failure.reason,
            "Skipped malformed payload element"
        );
    }

    let mut task_ids = Vec::with_capacity(batch.events.len());
    for event in batch.events {
        let task_id = state
            .queue
            .accept(event)
            .map_err(WebhookHandlerError::QueueUnavailable)?;
        task_ids.push(task_id);
    }

    info!(
        correlation_id = %request.correlation_id,
        accepted = task_ids.len(),
        parse_failures = batch.failures.len(),
        "Webhook accepted for processing"
    );

    Ok(Json(WebhookResponse {
        accepted: task_ids.len(),
        parse_failures: batch.failures.len(),
        task_ids,
    }))
}

/// Errors returned to the provider from the webhook endpoint.
///
/// Only verification and parse outcomes surface here; internal processing
/// errors never reach the provider.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    #[error("Invalid webhook headers: {0}")]
    InvalidHeaders(ValidationError),

    #[error("Webhook rejected: {0}")]
    Unauthorized(WebhookError),

    #[error("Request body is not valid JSON: {0}")]
    MalformedJson(serde_json::Error),

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(QueueError),
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::InvalidHeaders(_) => (StatusCode::BAD_REQUEST, "invalid_headers"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::MalformedJson(_) => (StatusCode::BAD_REQUEST, "malformed_json"),
            Self::QueueUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "queue_unavailable"),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// JSON body for error responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// ============================================================================
// Health and Admin Handlers
// ============================================================================

/// Health check response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Liveness probe
pub async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now().to_rfc3339(),
    })
}

/// Readiness probe: ready while the queue accepts work
pub async fn handle_readiness_check(State(state): State<AppState>) -> Response {
    // Probe with the queue's own state rather than a sentinel task
    let in_flight = state.queue.in_flight_count();
    let body = Json(serde_json::json!({
        "status": "ready",
        "in_flight": in_flight,
    }));
    (StatusCode::OK, body).into_response()
}

/// Summary of one permanently-failed task for operator replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTaskSummary {
    pub task_id: String,
    pub event_id: String,
    pub attempts_made: u32,
    pub last_error: String,
    pub failed_at: String,
}

/// List permanently-failed tasks.
///
/// The terminal-failure record is the one queue outcome that must stay
/// externally observable so operators can replay events.
pub async fn list_failed_tasks(State(state): State<AppState>) -> Json<Vec<FailedTaskSummary>> {
    let summaries = state
        .queue
        .failed_tasks()
        .into_iter()
        .map(|record| FailedTaskSummary {
            task_id: record.task.task_id.to_string(),
            event_id: record.task.event.event_id.to_string(),
            attempts_made: record.attempts_made,
            last_error: record.last_error,
            failed_at: record.failed_at.to_rfc3339(),
        })
        .collect();

    Json(summaries)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
