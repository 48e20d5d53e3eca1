//! Fan-out Publisher
//!
//! Delivers price updates to per-subscriber outboxes.
//!
//! # Architecture
//!
//! Every subscriber connection owns one bounded `mpsc` outbox, so updates
//! for one subscriber keep their order. Publishing a tick looks up the
//! topic's members at the moment of the call and `try_send`s to each
//! outbox. A full or closed outbox loses that update for that subscriber
//! only; nothing blocks the tick path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::{SubscriberOutboxes, TickPublisher, TopicDirectory};
use crate::domain::streaming::{PriceUpdate, Tick};
use crate::domain::subscription::SubscriberId;
use crate::infrastructure::metrics;

/// Default capacity of a subscriber outbox.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Fan-out statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    /// Registered outboxes.
    pub outboxes: usize,
}

/// Topic-scoped publisher over per-subscriber outboxes.
pub struct FanoutPublisher {
    directory: Arc<dyn TopicDirectory>,
    outboxes: RwLock<HashMap<SubscriberId, mpsc::Sender<PriceUpdate>>>,
    capacity: usize,
}

impl FanoutPublisher {
    /// Create a publisher resolving topics through `directory`.
    #[must_use]
    pub fn new(directory: Arc<dyn TopicDirectory>, capacity: usize) -> Self {
        Self {
            directory,
            outboxes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            outboxes: self.outboxes.read().len(),
        }
    }

    fn try_deliver(&self, subscriber: SubscriberId, update: PriceUpdate) -> bool {
        let outboxes = self.outboxes.read();
        let Some(outbox) = outboxes.get(&subscriber) else {
            return false;
        };

        match outbox.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(update)) => {
                tracing::debug!(%subscriber, symbol = %update.symbol, "Outbox full, dropping update");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl TickPublisher for FanoutPublisher {
    fn publish(&self, tick: &Tick) -> usize {
        let members = self.directory.members(&tick.symbol);
        if members.is_empty() {
            return 0;
        }

        let update = PriceUpdate::from(tick);
        let delivered = members
            .iter()
            .filter(|&&id| self.try_deliver(id, update.clone()))
            .count();

        let dropped = members.len() - delivered;
        metrics::record_updates_delivered(delivered as u64);
        if dropped > 0 {
            metrics::record_updates_dropped(dropped as u64);
        }
        delivered
    }

    fn deliver(&self, subscriber: SubscriberId, update: PriceUpdate) -> bool {
        let delivered = self.try_deliver(subscriber, update);
        if delivered {
            metrics::record_updates_delivered(1);
        } else {
            metrics::record_updates_dropped(1);
        }
        delivered
    }
}

impl SubscriberOutboxes for FanoutPublisher {
    fn register(&self, subscriber: SubscriberId) -> mpsc::Receiver<PriceUpdate> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.outboxes.write().insert(subscriber, tx);
        rx
    }

    fn unregister(&self, subscriber: SubscriberId) -> bool {
        self.outboxes.write().remove(&subscriber).is_some()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::services::SubscriptionBroker;
    use crate::domain::pricing::PriceCache;
    use crate::domain::streaming::Symbol;

    fn setup(capacity: usize) -> (Arc<SubscriptionBroker>, FanoutPublisher) {
        let broker = Arc::new(SubscriptionBroker::synthetic(Arc::new(PriceCache::new())));
        let publisher = FanoutPublisher::new(broker.clone(), capacity);
        (broker, publisher)
    }

    fn tick(symbol: &str, cents: i64) -> Tick {
        Tick::new(Symbol::parse(symbol).unwrap(), Decimal::new(cents, 2), 1)
    }

    #[test]
    fn publish_reaches_only_topic_members() {
        let (broker, publisher) = setup(8);
        let (a, b) = (SubscriberId::generate(), SubscriberId::generate());
        let mut rx_a = publisher.register(a);
        let mut rx_b = publisher.register(b);
        broker.join(a, "AAPL");
        broker.join(b, "MSFT");

        assert_eq!(publisher.publish(&tick("AAPL", 10_000)), 1);

        let update = rx_a.try_recv().unwrap();
        assert_eq!(update.symbol.as_str(), "AAPL");
        assert_eq!(update.price, Some(Decimal::new(10_000, 2)));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn publish_without_members_is_noop() {
        let (_broker, publisher) = setup(8);
        assert_eq!(publisher.publish(&tick("AAPL", 1)), 0);
    }

    #[test]
    fn full_outbox_drops_for_that_subscriber_only() {
        let (broker, publisher) = setup(1);
        let (slow, fast) = (SubscriberId::generate(), SubscriberId::generate());
        let _rx_slow = publisher.register(slow);
        let mut rx_fast = publisher.register(fast);
        broker.join(slow, "AAPL");
        broker.join(fast, "AAPL");

        assert_eq!(publisher.publish(&tick("AAPL", 100)), 2);
        // Drain only the fast subscriber.
        rx_fast.try_recv().unwrap();

        assert_eq!(publisher.publish(&tick("AAPL", 101)), 1);
        assert_eq!(rx_fast.try_recv().unwrap().price, Some(Decimal::new(101, 2)));
    }

    #[test]
    fn updates_keep_order_per_subscriber() {
        let (broker, publisher) = setup(16);
        let id = SubscriberId::generate();
        let mut rx = publisher.register(id);
        broker.join(id, "AAPL");

        for cents in 1..=5 {
            publisher.publish(&tick("AAPL", cents));
        }

        let prices: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|u| u.price)
            .collect();
        assert_eq!(prices, (1..=5).map(|c| Decimal::new(c, 2)).collect::<Vec<_>>());
    }

    #[test]
    fn unregister_stops_delivery() {
        let (broker, publisher) = setup(8);
        let id = SubscriberId::generate();
        let _rx = publisher.register(id);
        broker.join(id, "AAPL");

        assert!(publisher.unregister(id));
        assert!(!publisher.unregister(id));
        assert_eq!(publisher.publish(&tick("AAPL", 1)), 0);
        assert_eq!(publisher.stats(), FanoutStats::default());
    }

    #[test]
    fn deliver_to_unknown_subscriber_fails() {
        let (_broker, publisher) = setup(8);
        let update = PriceUpdate::snapshot(Symbol::parse("AAPL").unwrap(), None, 0);
        assert!(!publisher.deliver(SubscriberId::generate(), update));
    }
}
