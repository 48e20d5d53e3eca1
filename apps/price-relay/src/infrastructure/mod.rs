//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Subscriber WebSocket and history HTTP server.
pub mod api;

/// Per-subscriber outboxes and topic-scoped fan-out.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Upstream Finnhub WebSocket client.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// Upstream REST history client.
pub mod history;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Random-walk tick generator used without an API key.
pub mod synthetic;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Subscriber WebSocket protocol and connection handling.
pub mod ws;
