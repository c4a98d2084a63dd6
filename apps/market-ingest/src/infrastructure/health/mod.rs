//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, ingestion progress, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status: stream state and last completed runs
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConnectionState, StreamConnection};
use crate::application::services::IngestStatus;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Live stream status.
    pub stream: StreamStatus,
    /// Last completed sync run per resolution code.
    pub last_sync: BTreeMap<&'static str, DateTime<Utc>>,
    /// Last completed snapshot refresh.
    pub last_snapshot_refresh: Option<DateTime<Utc>>,
    /// Last completed symbol discovery.
    pub last_discovery: Option<DateTime<Utc>>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Stream up (or disabled) and at least one run completed.
    Healthy,
    /// Stream down or nothing completed yet.
    Degraded,
    /// Stream down and nothing completed.
    Unhealthy,
}

/// Live stream status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Whether the stream driver runs.
    pub enabled: bool,
    /// Connection state.
    pub state: &'static str,
    /// Whether the stream is connected.
    pub connected: bool,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    status: Arc<IngestStatus>,
    stream: Option<Arc<dyn StreamConnection>>,
}

impl HealthServerState {
    /// Create new health server state. `stream` is `None` when the stream
    /// driver is disabled.
    #[must_use]
    pub fn new(
        version: String,
        status: Arc<IngestStatus>,
        stream: Option<Arc<dyn StreamConnection>>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            status,
            stream,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Routes served by the health server.
    #[must_use]
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Self::router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if build_health_response(&state).status == HealthStatus::Unhealthy {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection_state = state.stream.as_ref().map(|s| s.state());
    let stream = StreamStatus {
        enabled: connection_state.is_some(),
        state: connection_state.map_or("disabled", ConnectionState::as_str),
        connected: connection_state == Some(ConnectionState::Connected),
    };

    let last_sync: BTreeMap<&'static str, DateTime<Utc>> = state
        .status
        .last_syncs()
        .into_iter()
        .map(|(resolution, at)| (resolution.code(), at))
        .collect();
    let last_snapshot_refresh = state.status.last_snapshot_refresh();
    let last_discovery = state.status.last_discovery();

    let any_completed =
        !last_sync.is_empty() || last_snapshot_refresh.is_some() || last_discovery.is_some();

    HealthResponse {
        status: determine_health_status(connection_state, any_completed),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        stream,
        last_sync,
        last_snapshot_refresh,
        last_discovery,
    }
}

fn determine_health_status(stream: Option<ConnectionState>, any_completed: bool) -> HealthStatus {
    let stream_ok = stream.is_none_or(|s| s == ConnectionState::Connected);
    match (stream_ok, any_completed) {
        (true, true) => HealthStatus::Healthy,
        (false, false) => HealthStatus::Unhealthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
