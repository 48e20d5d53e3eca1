//! Finnhub WebSocket Message Types
//!
//! Inbound frames are JSON objects discriminated by a `type` field:
//!
//! ```json
//! {"type":"trade","data":[{"s":"AAPL","p":187.23,"t":1700000000000,"v":100}]}
//! {"type":"ping"}
//! {"type":"error","msg":"Subscribing to too many symbols"}
//! ```
//!
//! Outbound control frames:
//!
//! ```json
//! {"type":"subscribe","symbol":"AAPL"}
//! {"type":"unsubscribe","symbol":"AAPL"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::Symbol;

// =============================================================================
// Inbound
// =============================================================================

/// One inbound frame.
///
/// Trade records are kept as raw JSON so that one malformed record does not
/// discard the rest of the batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    /// Batch of trades.
    Trade {
        /// Raw trade records.
        #[serde(default)]
        data: Vec<serde_json::Value>,
    },
    /// Application-level keepalive.
    Ping,
    /// Error reported by the feed.
    Error {
        /// Human-readable message.
        #[serde(default)]
        msg: String,
    },
    /// Any other message type.
    #[serde(other)]
    Unknown,
}

/// One trade record inside a `trade` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeRecord {
    /// Symbol as sent by the feed.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade price.
    #[serde(rename = "p", with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Epoch milliseconds, if present.
    #[serde(rename = "t", default)]
    pub timestamp_ms: Option<i64>,
}

// =============================================================================
// Outbound
// =============================================================================

/// Control frame action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// Start streaming a symbol.
    Subscribe,
    /// Stop streaming a symbol.
    Unsubscribe,
}

/// Outbound control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlFrame {
    /// Action.
    #[serde(rename = "type")]
    pub kind: ControlKind,
    /// Target symbol.
    pub symbol: Symbol,
}

impl ControlFrame {
    /// Subscribe frame for `symbol`.
    #[must_use]
    pub const fn subscribe(symbol: Symbol) -> Self {
        Self {
            kind: ControlKind::Subscribe,
            symbol,
        }
    }

    /// Unsubscribe frame for `symbol`.
    #[must_use]
    pub const fn unsubscribe(symbol: Symbol) -> Self {
        Self {
            kind: ControlKind::Unsubscribe,
            symbol,
        }
    }
}
