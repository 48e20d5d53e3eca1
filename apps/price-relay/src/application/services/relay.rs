//! Tick relay: the single path every tick takes, live or synthetic.

use std::sync::Arc;

use crate::application::ports::TickPublisher;
use crate::domain::pricing::PriceCache;
use crate::domain::streaming::Tick;
use crate::infrastructure::metrics::{self, TickSource};

/// Writes ticks to the price cache and hands them to the publisher.
pub struct TickRelay {
    cache: Arc<PriceCache>,
    publisher: Arc<dyn TickPublisher>,
}

impl TickRelay {
    /// Create a relay over a shared cache and publisher.
    #[must_use]
    pub fn new(cache: Arc<PriceCache>, publisher: Arc<dyn TickPublisher>) -> Self {
        Self { cache, publisher }
    }

    /// Record `tick` as the latest price and fan it out.
    ///
    /// Returns the number of subscribers the update was queued for.
    pub fn ingest(&self, tick: &Tick, source: TickSource) -> usize {
        metrics::record_tick_received(source);
        self.cache.update(&tick.symbol, tick.price);
        let delivered = self.publisher.publish(tick);
        tracing::trace!(symbol = %tick.symbol, price = %tick.price, delivered, "Tick relayed");
        delivered
    }

    /// Shared price cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }
}
