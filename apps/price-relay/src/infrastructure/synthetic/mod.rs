//! Synthetic Tick Generator
//!
//! Stands in for the upstream feed when no API key is configured. On every
//! interval each cached symbol takes one bounded random-walk step and the
//! result is relayed exactly like a live tick.
//!
//! Symbols are walked in sorted order so a seeded RNG reproduces the same
//! sequence regardless of hash map iteration order.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::services::TickRelay;
use crate::domain::pricing::random_walk_step;
use crate::domain::streaming::{Tick, now_millis};
use crate::infrastructure::metrics::TickSource;

/// Random-walk tick generator.
pub struct SyntheticGenerator<R = StdRng> {
    relay: Arc<TickRelay>,
    volatility: f64,
    rng: R,
}

impl SyntheticGenerator<StdRng> {
    /// Create a generator seeded from the operating system.
    #[must_use]
    pub fn from_entropy(relay: Arc<TickRelay>, volatility: f64) -> Self {
        Self::new(relay, volatility, StdRng::from_os_rng())
    }
}

impl<R: Rng + Send> SyntheticGenerator<R> {
    /// Create a generator with an explicit random source.
    #[must_use]
    pub const fn new(relay: Arc<TickRelay>, volatility: f64, rng: R) -> Self {
        Self {
            relay,
            volatility,
            rng,
        }
    }

    /// Advance every cached symbol by one step and relay the new prices.
    ///
    /// Returns the generated ticks.
    pub fn step(&mut self) -> Vec<Tick> {
        let mut prices = self.relay.cache().snapshot();
        prices.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let ts = now_millis();
        prices
            .into_iter()
            .map(|(symbol, previous)| {
                let price = random_walk_step(previous, self.volatility, &mut self.rng);
                let tick = Tick::new(symbol, price, ts);
                self.relay.ingest(&tick, TickSource::Synthetic);
                tick
            })
            .collect()
    }

    /// Step on every `interval` until cancelled.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so prices move one
        // interval after startup.
        ticker.tick().await;

        tracing::info!(interval_ms = interval.as_millis(), volatility = self.volatility, "Synthetic generator started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let ticks = self.step();
                    tracing::trace!(count = ticks.len(), "Synthetic ticks generated");
                }
            }
        }

        tracing::info!("Synthetic generator stopped");
    }
}
