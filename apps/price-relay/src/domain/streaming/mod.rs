//! Market Data Streaming Types
//!
//! Core domain types for relayed market data: symbols, ticks, and the
//! price updates pushed to subscribers. These types are transport-agnostic
//! and represent the canonical internal representation of a price.

use std::borrow::Borrow;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbol
// =============================================================================

/// Uppercase ticker symbol, the sole topic key.
///
/// Construct through [`Symbol::parse`], which trims and uppercases the raw
/// input. Two spellings of the same ticker always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize raw subscriber or feed input into a symbol.
    ///
    /// Returns `None` when the input is empty after trimming or contains
    /// whitespace or control characters.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
        {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    /// Wrap a literal that is already a valid uppercase ticker.
    #[must_use]
    pub fn from_static(symbol: &'static str) -> Self {
        debug_assert!(Self::parse(symbol).is_some_and(|s| s.0 == symbol));
        Self(symbol.to_string())
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tick
// =============================================================================

/// A single price observation from the live feed or the synthetic generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Last traded (or generated) price.
    pub price: Decimal,
    /// Observation time in epoch milliseconds.
    pub timestamp_ms: i64,
}

impl Tick {
    /// Create a new tick.
    #[must_use]
    pub const fn new(symbol: Symbol, price: Decimal, timestamp_ms: i64) -> Self {
        Self {
            symbol,
            price,
            timestamp_ms,
        }
    }
}

// =============================================================================
// Price Update
// =============================================================================

/// Price event delivered to a subscriber.
///
/// `price` is `None` only for the reply to a join on a symbol that has not
/// been priced yet.
///
/// # Wire Format (JSON)
/// ```json
/// {"symbol": "AAPL", "price": 187.23, "ts": 1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Latest price, if known.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    /// Epoch milliseconds.
    pub ts: i64,
}

impl PriceUpdate {
    /// Create a snapshot update for a symbol.
    #[must_use]
    pub const fn snapshot(symbol: Symbol, price: Option<Decimal>, ts: i64) -> Self {
        Self { symbol, price, ts }
    }
}

impl From<&Tick> for PriceUpdate {
    fn from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            price: Some(tick.price),
            ts: tick.timestamp_ms,
        }
    }
}

// =============================================================================
// History
// =============================================================================

/// One point of a price history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Epoch milliseconds.
    pub t: i64,
    /// Price at `t`.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
