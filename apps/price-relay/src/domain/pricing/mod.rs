//! Pricing Types
//!
//! The process-wide last-price cache and the bounded random walk used by
//! synthetic mode.
//!
//! # Rounding
//!
//! Every synthetic step is rounded to two decimal places (half away from
//! zero) and the rounded value is what gets stored and compounded on the
//! next step. Replaying the same random sequence therefore reproduces the
//! same prices exactly.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

use super::streaming::Symbol;

/// Lower bound of a freshly seeded synthetic price.
pub const SEED_PRICE_MIN: f64 = 10.0;

/// Upper bound (exclusive) of a freshly seeded synthetic price.
pub const SEED_PRICE_MAX: f64 = 210.0;

// =============================================================================
// Random Walk
// =============================================================================

/// Round a price to two decimal places, half away from zero.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute `round2(previous * (1 + change))`.
///
/// Falls back to the rounded previous price if the product overflows.
#[must_use]
pub fn apply_change(previous: Decimal, change: f64) -> Decimal {
    let change = Decimal::try_from(change).unwrap_or_default();
    previous
        .checked_mul(Decimal::ONE + change)
        .map_or_else(|| round2(previous), round2)
}

/// Take one bounded random-walk step.
///
/// The relative change is drawn uniformly from `[-volatility, +volatility]`.
/// A zero or non-finite volatility leaves the price unchanged apart from
/// rounding. The walk is not clamped: extreme volatility can drive the price
/// to zero or below.
pub fn random_walk_step<R: Rng + ?Sized>(
    previous: Decimal,
    volatility: f64,
    rng: &mut R,
) -> Decimal {
    let bound = volatility.abs();
    if !bound.is_finite() || bound == 0.0 {
        return round2(previous);
    }
    apply_change(previous, rng.random_range(-bound..=bound))
}

/// Draw a rounded price uniformly from `[low, high)`.
///
/// Returns `round2(low)` when the range is empty.
pub fn random_price<R: Rng + ?Sized>(low: f64, high: f64, rng: &mut R) -> Decimal {
    let value = if low < high {
        rng.random_range(low..high)
    } else {
        low
    };
    round2(Decimal::try_from(value).unwrap_or_default())
}

/// Draw a seed price for a newly tracked synthetic symbol.
pub fn seed_price<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    random_price(SEED_PRICE_MIN, SEED_PRICE_MAX, rng)
}

// =============================================================================
// Price Cache
// =============================================================================

/// Process-wide mapping from symbol to last observed price.
///
/// Entries are created lazily (first tick, or first synthetic subscription)
/// and are never removed for the lifetime of the process.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: RwLock<HashMap<Symbol, Decimal>>,
}

impl PriceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the last price for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.read().get(symbol).copied()
    }

    /// Record a new price for a symbol.
    pub fn update(&self, symbol: &Symbol, price: Decimal) {
        self.prices.write().insert(symbol.clone(), price);
    }

    /// Insert a price produced by `seed` unless the symbol is already cached.
    ///
    /// Returns the cached price after the call.
    pub fn seed_if_absent(&self, symbol: &Symbol, seed: impl FnOnce() -> Decimal) -> Decimal {
        if let Some(price) = self.get(symbol) {
            return price;
        }
        *self.prices.write().entry(symbol.clone()).or_insert_with(seed)
    }

    /// Copy out every cached `(symbol, price)` pair.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Symbol, Decimal)> {
        self.prices
            .read()
            .iter()
            .map(|(symbol, price)| (symbol.clone(), *price))
            .collect()
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether no symbol has been priced yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}
