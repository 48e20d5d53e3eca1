//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (synthetic mode or feed connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::SubscriptionBroker;
use crate::infrastructure::broadcast::FanoutPublisher;
use crate::infrastructure::feed::{ConnectionState, FeedState};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// `live` or `synthetic`.
    pub mode: &'static str,
    /// Upstream feed status; absent in synthetic mode.
    pub feed: Option<FeedInfo>,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
    /// Number of symbols with a cached price.
    pub cached_symbols: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ticks are flowing (feed connected, or synthetic mode).
    Healthy,
    /// Feed is reconnecting; subscribers are still served.
    Degraded,
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether the feed is connected.
    pub connected: bool,
    /// Ticks received since startup.
    pub ticks_received: u64,
    /// Reconnection attempts since startup.
    pub reconnect_attempts: u64,
    /// Time of the last successful connection.
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Subscribers joined to at least one topic.
    pub subscribers: usize,
    /// Symbols with at least one subscriber.
    pub topics: usize,
    /// Open subscriber connections.
    pub connections: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feed: Option<Arc<FeedState>>,
    broker: Arc<SubscriptionBroker>,
    publisher: Arc<FanoutPublisher>,
}

impl HealthServerState {
    /// Create new health server state. `feed` is `None` in synthetic mode.
    #[must_use]
    pub fn new(
        version: String,
        feed: Option<Arc<FeedState>>,
        broker: Arc<SubscriptionBroker>,
        publisher: Arc<FanoutPublisher>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feed,
            broker,
            publisher,
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

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    Json(build_health_response(&state))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if is_ready(state.feed.as_deref()) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
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
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Ready in synthetic mode, or when the feed is connected.
fn is_ready(feed: Option<&FeedState>) -> bool {
    feed.is_none_or(FeedState::is_connected)
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed.as_deref().map(|feed| FeedInfo {
        state: feed.get_state(),
        connected: feed.is_connected(),
        ticks_received: feed.get_ticks_received(),
        reconnect_attempts: feed.get_reconnect_attempts(),
        last_connected_at: feed.last_connected_at(),
    });

    let status = if is_ready(state.feed.as_deref()) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };
    let stats = state.broker.stats();

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        mode: if state.feed.is_some() { "live" } else { "synthetic" },
        feed,
        subscriptions: SubscriptionStatus {
            subscribers: stats.subscriber_count,
            topics: stats.topic_count,
            connections: state.publisher.stats().outboxes,
        },
        cached_symbols: state.broker.cache().len(),
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

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::pricing::PriceCache;

    fn state(feed: Option<Arc<FeedState>>) -> Arc<HealthServerState> {
        let broker = Arc::new(SubscriptionBroker::synthetic(Arc::new(PriceCache::new())));
        let publisher = Arc::new(FanoutPublisher::new(broker.clone(), 8));
        Arc::new(HealthServerState::new("0.1.0".to_string(), feed, broker, publisher))
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> StatusCode {
        router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn synthetic_mode_is_ready() {
        let response = build_health_response(&state(None));
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.mode, "synthetic");
        assert!(response.feed.is_none());
    }

    #[test]
    fn disconnected_feed_is_degraded() {
        let response = build_health_response(&state(Some(Arc::new(FeedState::new()))));
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.mode, "live");
        assert_eq!(response.feed.unwrap().state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn readiness_follows_feed_state() {
        let feed = Arc::new(FeedState::new());
        let state = state(Some(Arc::clone(&feed)));

        assert_eq!(get(Arc::clone(&state), "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);

        feed.set_state(ConnectionState::Connected);
        assert_eq!(get(Arc::clone(&state), "/readyz").await, StatusCode::OK);
        assert_eq!(get(state, "/healthz").await, StatusCode::OK);
    }
}
