//! Subscription Broker
//!
//! Owns topic membership and decides when the upstream feed must be told
//! to start or stop sending ticks for a symbol.
//!
//! # Upstream Transitions
//!
//! | Event                          | Live mode               | Synthetic mode        |
//! |--------------------------------|-------------------------|-----------------------|
//! | first member joins a symbol    | one upstream subscribe  | seed price if absent  |
//! | last member leaves a symbol    | one upstream unsubscribe| nothing               |
//!
//! Upstream requests are issued while the table lock is held. The port only
//! enqueues, so requests for one symbol reach the connection task in the same
//! order as the membership transitions that caused them.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::{TopicDirectory, UpstreamPort};
use crate::domain::pricing::{PriceCache, seed_price};
use crate::domain::streaming::{PriceUpdate, Symbol, now_millis};
use crate::domain::subscription::{
    JoinOutcome, LeaveOutcome, SubscriberId, SubscriptionStats, SubscriptionTable,
};
use crate::infrastructure::metrics;

/// Where first/last membership transitions are routed.
#[derive(Clone)]
pub enum BrokerMode {
    /// Upstream feed configured: transitions become control requests.
    Live(Arc<dyn UpstreamPort>),
    /// No upstream: first joins seed the price cache.
    Synthetic,
}

impl std::fmt::Debug for BrokerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::Synthetic => f.write_str("Synthetic"),
        }
    }
}

/// Topic-based subscription broker.
#[derive(Debug)]
pub struct SubscriptionBroker {
    table: Mutex<SubscriptionTable>,
    cache: Arc<PriceCache>,
    mode: BrokerMode,
}

impl SubscriptionBroker {
    /// Create a broker routing transitions according to `mode`.
    #[must_use]
    pub fn new(cache: Arc<PriceCache>, mode: BrokerMode) -> Self {
        Self {
            table: Mutex::new(SubscriptionTable::new()),
            cache,
            mode,
        }
    }

    /// Create a broker backed by an upstream feed.
    #[must_use]
    pub fn live(cache: Arc<PriceCache>, upstream: Arc<dyn UpstreamPort>) -> Self {
        Self::new(cache, BrokerMode::Live(upstream))
    }

    /// Create a broker for synthetic mode.
    #[must_use]
    pub fn synthetic(cache: Arc<PriceCache>) -> Self {
        Self::new(cache, BrokerMode::Synthetic)
    }

    /// Whether the broker forwards transitions to an upstream feed.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self.mode, BrokerMode::Live(_))
    }

    /// Join `subscriber` to the topic named by `raw_symbol`.
    ///
    /// Returns the snapshot to deliver immediately to the subscriber, with
    /// `price: None` when nothing has been observed yet. Returns `None` only
    /// for invalid symbol input, in which case nothing changes.
    pub fn join(&self, subscriber: SubscriberId, raw_symbol: &str) -> Option<PriceUpdate> {
        self.join_with(subscriber, raw_symbol, |snapshot| snapshot)
    }

    /// Like [`join`](Self::join), but hands the snapshot to `reply` while the
    /// table lock is still held.
    ///
    /// A tick can only reach the new member after the lock is released, so
    /// a snapshot queued by `reply` is never overtaken by an older price.
    /// `reply` must not block or call back into the broker.
    pub fn join_with<T>(
        &self,
        subscriber: SubscriberId,
        raw_symbol: &str,
        reply: impl FnOnce(PriceUpdate) -> T,
    ) -> Option<T> {
        let symbol = Symbol::parse(raw_symbol)?;

        let (replied, stats) = {
            let mut table = self.table.lock();
            let outcome = table.join(subscriber, &symbol);

            if outcome == JoinOutcome::FirstMember {
                match &self.mode {
                    BrokerMode::Live(upstream) => upstream.request_subscribe(&symbol),
                    BrokerMode::Synthetic => {
                        self.cache
                            .seed_if_absent(&symbol, || seed_price(&mut rand::rng()));
                    }
                }
                tracing::debug!(%symbol, "Topic activated");
            }

            debug_assert!(table.is_consistent());
            let price = self.cache.get(&symbol);
            let replied = reply(PriceUpdate::snapshot(symbol, price, now_millis()));
            (replied, table.stats())
        };
        metrics::set_subscription_stats(stats);

        Some(replied)
    }

    /// Remove `subscriber` from the topic named by `raw_symbol`.
    pub fn leave(&self, subscriber: SubscriberId, raw_symbol: &str) {
        let Some(symbol) = Symbol::parse(raw_symbol) else {
            return;
        };

        let stats = {
            let mut table = self.table.lock();
            if table.leave(subscriber, &symbol) == LeaveOutcome::LastMember {
                self.topic_emptied(&symbol);
            }
            debug_assert!(table.is_consistent());
            table.stats()
        };
        metrics::set_subscription_stats(stats);
    }

    /// Remove `subscriber` from every topic it joined.
    ///
    /// Unknown subscribers are ignored, so repeated calls are harmless.
    pub fn drop_subscriber(&self, subscriber: SubscriberId) {
        let stats = {
            let mut table = self.table.lock();
            for symbol in table.remove_subscriber(subscriber) {
                self.topic_emptied(&symbol);
            }
            debug_assert!(table.is_consistent());
            table.stats()
        };
        metrics::set_subscription_stats(stats);
    }

    fn topic_emptied(&self, symbol: &Symbol) {
        if let BrokerMode::Live(upstream) = &self.mode {
            upstream.request_unsubscribe(symbol);
        }
        tracing::debug!(%symbol, "Topic emptied");
    }

    /// Symbols `subscriber` is joined to.
    #[must_use]
    pub fn topics_of(&self, subscriber: SubscriberId) -> Vec<Symbol> {
        self.table.lock().topics(subscriber)
    }

    /// Membership statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.table.lock().stats()
    }

    /// Shared price cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }
}

impl TopicDirectory for SubscriptionBroker {
    fn members(&self, symbol: &Symbol) -> Vec<SubscriberId> {
        self.table.lock().members(symbol)
    }

    fn active_symbols(&self) -> Vec<Symbol> {
        self.table.lock().active_symbols()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use mockall::predicate::always;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockUpstreamPort;

    fn live_broker(upstream: MockUpstreamPort) -> SubscriptionBroker {
        SubscriptionBroker::live(Arc::new(PriceCache::new()), Arc::new(upstream))
    }

    #[test]
    fn first_join_subscribes_upstream_once() {
        let mut upstream = MockUpstreamPort::new();
        upstream
            .expect_request_subscribe()
            .withf(|s| s.as_str() == "AAPL")
            .times(1)
            .return_const(());
        upstream.expect_request_unsubscribe().never();

        let broker = live_broker(upstream);
        broker.join(SubscriberId::generate(), "aapl");
        broker.join(SubscriberId::generate(), "AAPL");
    }

    #[test]
    fn last_leave_unsubscribes_upstream_once() {
        let mut upstream = MockUpstreamPort::new();
        upstream
            .expect_request_subscribe()
            .with(always())
            .times(1)
            .return_const(());
        upstream
            .expect_request_unsubscribe()
            .withf(|s| s.as_str() == "AAPL")
            .times(1)
            .return_const(());

        let broker = live_broker(upstream);
        let (a, b) = (SubscriberId::generate(), SubscriberId::generate());
        broker.join(a, "AAPL");
        broker.join(b, "AAPL");

        broker.leave(a, "AAPL");
        broker.leave(b, "AAPL");
        // Second leave for b is a no-op.
        broker.leave(b, "AAPL");
    }

    #[test]
    fn duplicate_join_emits_nothing() {
        let mut upstream = MockUpstreamPort::new();
        upstream
            .expect_request_subscribe()
            .times(1)
            .return_const(());
        upstream
            .expect_request_unsubscribe()
            .times(1)
            .return_const(());

        let broker = live_broker(upstream);
        let a = SubscriberId::generate();
        broker.join(a, "MSFT");
        broker.join(a, "msft");
        broker.leave(a, "MSFT");

        assert_eq!(broker.stats(), SubscriptionStats::default());
    }

    #[test]
    fn drop_unsubscribes_emptied_topics_only() {
        let mut upstream = MockUpstreamPort::new();
        upstream
            .expect_request_subscribe()
            .times(2)
            .return_const(());
        upstream
            .expect_request_unsubscribe()
            .withf(|s| s.as_str() == "AAPL")
            .times(1)
            .return_const(());

        let broker = live_broker(upstream);
        let (a, b) = (SubscriberId::generate(), SubscriberId::generate());
        broker.join(a, "AAPL");
        broker.join(a, "MSFT");
        broker.join(b, "MSFT");

        broker.drop_subscriber(a);
        broker.drop_subscriber(a);

        assert_eq!(broker.members(&Symbol::parse("MSFT").unwrap()), vec![b]);
        assert!(broker.topics_of(a).is_empty());
    }

    #[test]
    fn invalid_symbol_changes_nothing() {
        let mut upstream = MockUpstreamPort::new();
        upstream.expect_request_subscribe().never();
        upstream.expect_request_unsubscribe().never();

        let broker = live_broker(upstream);
        let a = SubscriberId::generate();

        assert!(broker.join(a, "   ").is_none());
        broker.leave(a, "");
        assert_eq!(broker.stats(), SubscriptionStats::default());
    }

    #[test]
    fn join_reply_carries_cached_price() {
        let mut upstream = MockUpstreamPort::new();
        upstream.expect_request_subscribe().return_const(());

        let cache = Arc::new(PriceCache::new());
        cache.update(&Symbol::parse("AAPL").unwrap(), Decimal::from_str("187.23").unwrap());
        let broker = SubscriptionBroker::live(cache, Arc::new(upstream));

        let cached = broker.join(SubscriberId::generate(), "aapl").unwrap();
        assert_eq!(cached.symbol.as_str(), "AAPL");
        assert_eq!(cached.price, Some(Decimal::from_str("187.23").unwrap()));

        let unknown = broker.join(SubscriberId::generate(), "NVDA").unwrap();
        assert_eq!(unknown.price, None);
    }

    #[test]
    fn synthetic_first_join_seeds_cache() {
        let cache = Arc::new(PriceCache::new());
        let broker = SubscriptionBroker::synthetic(Arc::clone(&cache));

        let reply = broker.join(SubscriberId::generate(), "tsla").unwrap();
        let price = reply.price.unwrap();

        assert!(price >= Decimal::from(10) && price <= Decimal::from(210));
        assert_eq!(cache.get(&Symbol::parse("TSLA").unwrap()), Some(price));

        // Later joins see the same seeded price.
        let again = broker.join(SubscriberId::generate(), "TSLA").unwrap();
        assert_eq!(again.price, Some(price));
    }

    #[test]
    fn synthetic_join_keeps_existing_price() {
        let cache = Arc::new(PriceCache::new());
        cache.update(&Symbol::parse("GOOG").unwrap(), Decimal::new(14_000, 2));
        let broker = SubscriptionBroker::synthetic(Arc::clone(&cache));

        let reply = broker.join(SubscriberId::generate(), "GOOG").unwrap();
        assert_eq!(reply.price, Some(Decimal::new(14_000, 2)));
    }

    #[test]
    fn active_symbols_tracks_membership() {
        let broker = SubscriptionBroker::synthetic(Arc::new(PriceCache::new()));
        let a = SubscriberId::generate();

        broker.join(a, "AAPL");
        broker.join(a, "MSFT");
        broker.leave(a, "MSFT");

        assert_eq!(broker.active_symbols(), vec![Symbol::parse("AAPL").unwrap()]);
        assert!(!broker.is_live());
    }
}
