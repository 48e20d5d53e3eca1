//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `UpstreamPort`: subscribe/unsubscribe requests to the upstream feed
//! - `TickPublisher`: delivery of ticks to joined subscribers
//! - `SubscriberOutboxes`: per-subscriber outbox registration
//! - `HistoryPort`: historical price series from the upstream REST API
//!
//! ## Driver Ports (Inbound)
//!
//! - `TopicDirectory`: read-only view of topic membership, queried by the
//!   publisher and by the feed client during reconciliation

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::streaming::{HistoryPoint, PriceUpdate, Symbol, Tick};
use crate::domain::subscription::SubscriberId;

// =============================================================================
// Upstream Port
// =============================================================================

/// Control requests towards the upstream feed.
///
/// Both methods must return without blocking: they are invoked while the
/// broker holds its table lock. Implementations drop the request when the
/// upstream connection is not established.
#[cfg_attr(test, mockall::automock)]
pub trait UpstreamPort: Send + Sync {
    /// Ask the upstream feed to start sending ticks for `symbol`.
    fn request_subscribe(&self, symbol: &Symbol);

    /// Ask the upstream feed to stop sending ticks for `symbol`.
    fn request_unsubscribe(&self, symbol: &Symbol);
}

// =============================================================================
// Topic Directory
// =============================================================================

/// Read-only membership queries.
pub trait TopicDirectory: Send + Sync {
    /// Subscribers currently joined to `symbol`.
    fn members(&self, symbol: &Symbol) -> Vec<SubscriberId>;

    /// Symbols with at least one joined subscriber.
    fn active_symbols(&self) -> Vec<Symbol>;
}

// =============================================================================
// Tick Publisher
// =============================================================================

/// Delivery of price updates to subscriber outboxes.
pub trait TickPublisher: Send + Sync {
    /// Deliver `tick` to every subscriber joined to its symbol.
    ///
    /// Returns the number of subscribers the update was queued for.
    fn publish(&self, tick: &Tick) -> usize;

    /// Deliver a single update to one subscriber.
    ///
    /// Returns `false` if the subscriber's outbox is full, closed, or unknown.
    fn deliver(&self, subscriber: SubscriberId, update: PriceUpdate) -> bool;
}

/// Registration of per-subscriber outboxes.
pub trait SubscriberOutboxes: TickPublisher {
    /// Create the outbox for `subscriber` and return its receiving end.
    ///
    /// Registering an ID twice replaces the previous outbox.
    fn register(&self, subscriber: SubscriberId) -> mpsc::Receiver<PriceUpdate>;

    /// Remove the outbox for `subscriber`. Returns `false` if none existed.
    fn unregister(&self, subscriber: SubscriberId) -> bool;
}

// =============================================================================
// History Port
// =============================================================================

/// Errors returned by a history source.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// HTTP transport failed.
    #[error("history request failed: {0}")]
    Transport(String),

    /// Upstream returned a non-success HTTP status.
    #[error("history request returned HTTP {0}")]
    Status(u16),

    /// Response body could not be decoded.
    #[error("history response could not be decoded: {0}")]
    Decode(String),

    /// Upstream reported no data for the requested window.
    #[error("history unavailable (status: {0})")]
    NoData(String),

    /// Request did not complete within the configured timeout.
    #[error("history request timed out after {0} ms")]
    Timeout(u64),
}

/// Historical price series source.
#[async_trait]
pub trait HistoryPort: Send + Sync {
    /// Fetch the price history for `symbol` over `range` (`1d`, `5d`, `1m`).
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        range: &str,
    ) -> Result<Vec<HistoryPoint>, HistoryError>;
}
