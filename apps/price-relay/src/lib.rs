#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::items_after_statements
    )
)]

//! Price Relay - Streaming Price Multiplexer
//!
//! Keeps a single connection to the Finnhub trade stream and fans price
//! ticks out to WebSocket subscribers grouped by symbol. Without an API key
//! a random-walk generator stands in for the upstream feed.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: Symbols, ticks, and subscriber-facing updates
//!   - `pricing`: Price cache and random-walk arithmetic
//!   - `subscription`: Topic membership table
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream control, fan-out, and history interfaces
//!   - `services`: Subscription broker, tick relay, connection lifecycle, history
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Upstream WebSocket client with reconnect and reconciliation
//!   - `synthetic`: Random-walk generator
//!   - `broadcast`: Per-subscriber outboxes
//!   - `ws` / `api`: Subscriber WebSocket and history endpoint
//!   - `history`: Upstream candle REST client
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Finnhub WS ──┐                                   ┌──► Subscriber 1
//!              ├──► TickRelay ──► PriceCache       │
//! Synthetic ───┘        │                          ├──► Subscriber 2
//!                       └──► FanoutPublisher ──────┤
//!                              (topic members)     └──► Subscriber N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pricing::PriceCache;
pub use domain::streaming::{HistoryPoint, PriceUpdate, Symbol, Tick};
pub use domain::subscription::{SubscriberId, SubscriptionStats, SubscriptionTable};

// Application services
pub use application::services::{
    ConnectionLifecycle, HistoryService, HistorySettings, SubscriberSession, SubscriptionBroker,
    TickRelay,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, Credentials, FeedMode, RelayConfig, ServerSettings, SyntheticSettings,
    UpstreamSettings,
};

// Servers
pub use infrastructure::api::{ApiServer, ApiServerError, ApiState};
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Upstream feed (for integration tests)
pub use infrastructure::feed::{
    ConnectionState, FeedClient, FeedClientConfig, FeedEvent, FeedHandle, FeedState,
    ReconnectConfig,
};

// Fan-out and synthetic source
pub use infrastructure::broadcast::FanoutPublisher;
pub use infrastructure::synthetic::SyntheticGenerator;

// Metrics
pub use infrastructure::metrics::{TickSource, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
