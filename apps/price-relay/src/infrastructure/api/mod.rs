//! Subscriber-facing HTTP server.
//!
//! # Endpoints
//!
//! - `GET /ws` - subscriber WebSocket (see [`crate::infrastructure::ws`])
//! - `GET /api/history?symbol=&range=` - price history, always `200`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::application::services::{ConnectionLifecycle, HistoryService};
use crate::infrastructure::ws::ws_handler;

/// Shared state for API handlers.
pub struct ApiState {
    /// Opens subscriber sessions for WebSocket connections.
    pub lifecycle: ConnectionLifecycle,
    /// Serves history lookups.
    pub history: Arc<HistoryService>,
}

/// Query parameters of the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Ticker symbol (default `AAPL`).
    pub symbol: Option<String>,
    /// Range: `1d`, `5d`, or `1m` (default `1d`).
    pub range: Option<String>,
}

/// Build the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/history", get(history_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn history_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    Json(
        state
            .history
            .history(query.symbol.as_deref(), query.range.as_deref())
            .await,
    )
}

/// Subscriber WebSocket and history HTTP server.
pub struct ApiServer {
    port: u16,
    state: Arc<ApiState>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<ApiState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the server stops with an
    /// error.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if the server stops with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ApiServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::application::services::{HistorySettings, SubscriptionBroker};
    use crate::domain::pricing::PriceCache;
    use crate::infrastructure::broadcast::FanoutPublisher;

    fn state() -> Arc<ApiState> {
        let cache = Arc::new(PriceCache::new());
        let broker = Arc::new(SubscriptionBroker::synthetic(Arc::clone(&cache)));
        let publisher = Arc::new(FanoutPublisher::new(broker.clone(), 8));
        Arc::new(ApiState {
            lifecycle: ConnectionLifecycle::new(broker, publisher),
            history: Arc::new(HistoryService::new(None, cache, HistorySettings::default())),
        })
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn history_defaults() {
        let (status, body) = get_json("/api/history").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "AAPL");
        assert_eq!(body["range"], "1d");
        assert_eq!(body["history"].as_array().unwrap().len(), 300);
        assert!(body["history"][0]["t"].is_i64());
        assert!(body["history"][0]["price"].is_number());
    }

    #[tokio::test]
    async fn history_normalizes_symbol() {
        let (status, body) = get_json("/api/history?symbol=tsla&range=5d").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "TSLA");
        assert_eq!(body["range"], "5d");
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let response = router(state())
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
