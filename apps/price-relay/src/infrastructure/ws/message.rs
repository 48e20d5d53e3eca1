//! Subscriber WebSocket message types.
//!
//! Client frames:
//!
//! ```json
//! {"event":"subscribe","symbol":"aapl"}
//! {"event":"unsubscribe","symbol":"aapl"}
//! ```
//!
//! Server frames:
//!
//! ```json
//! {"event":"price","symbol":"AAPL","price":187.23,"ts":1700000000000}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::streaming::PriceUpdate;

/// Client-to-server message types.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientEvent {
    /// Join a symbol topic.
    Subscribe {
        /// Raw symbol; normalized by the broker.
        symbol: String,
    },
    /// Leave a symbol topic.
    Unsubscribe {
        /// Raw symbol; normalized by the broker.
        symbol: String,
    },
}

/// Server-to-client message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Price update for a joined symbol.
    Price(PriceUpdate),
}

impl From<PriceUpdate> for ServerEvent {
    fn from(update: PriceUpdate) -> Self {
        Self::Price(update)
    }
}
