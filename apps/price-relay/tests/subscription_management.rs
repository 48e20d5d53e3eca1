//! Subscription Management Integration Tests
//!
//! Tests topic membership, fan-out scoping, and connection cleanup through
//! the public service API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use price_relay::application::ports::UpstreamPort;
use price_relay::{
    ConnectionLifecycle, FanoutPublisher, PriceCache, SubscriptionBroker, Symbol, Tick, TickRelay,
    TickSource,
};

/// Records upstream control requests.
#[derive(Default)]
struct RecordingUpstream {
    requests: parking_lot::Mutex<Vec<String>>,
}

impl UpstreamPort for RecordingUpstream {
    fn request_subscribe(&self, symbol: &Symbol) {
        self.requests.lock().push(format!("+{symbol}"));
    }

    fn request_unsubscribe(&self, symbol: &Symbol) {
        self.requests.lock().push(format!("-{symbol}"));
    }
}

struct Relay {
    broker: Arc<SubscriptionBroker>,
    publisher: Arc<FanoutPublisher>,
    relay: TickRelay,
    lifecycle: ConnectionLifecycle,
}

fn setup(broker: SubscriptionBroker) -> Relay {
    let broker = Arc::new(broker);
    let publisher = Arc::new(FanoutPublisher::new(broker.clone(), 64));
    let relay = TickRelay::new(Arc::clone(broker.cache()), publisher.clone());
    let lifecycle = ConnectionLifecycle::new(Arc::clone(&broker), publisher.clone());
    Relay {
        broker,
        publisher,
        relay,
        lifecycle,
    }
}

fn tick(symbol: &str, price: &str) -> Tick {
    Tick::new(
        Symbol::parse(symbol).unwrap(),
        Decimal::from_str(price).unwrap(),
        1_700_000_000_000,
    )
}

#[test]
fn ticks_reach_only_subscribers_of_their_symbol() {
    let relay = setup(SubscriptionBroker::synthetic(Arc::new(PriceCache::new())));
    let (apple, mut apple_rx) = relay.lifecycle.open();
    let (msft, mut msft_rx) = relay.lifecycle.open();

    assert!(apple.join("aapl"));
    assert!(msft.join("MSFT"));
    // Drain join snapshots.
    assert_eq!(apple_rx.try_recv().unwrap().symbol.as_str(), "AAPL");
    assert_eq!(msft_rx.try_recv().unwrap().symbol.as_str(), "MSFT");

    assert_eq!(relay.relay.ingest(&tick("AAPL", "190.12"), TickSource::Upstream), 1);

    let update = apple_rx.try_recv().unwrap();
    assert_eq!(update.price, Some(Decimal::from_str("190.12").unwrap()));
    assert!(msft_rx.try_recv().is_err());
}

#[test]
fn ticks_for_unwatched_symbols_still_update_cache() {
    let relay = setup(SubscriptionBroker::synthetic(Arc::new(PriceCache::new())));

    assert_eq!(relay.relay.ingest(&tick("NVDA", "900.5"), TickSource::Upstream), 0);
    assert_eq!(
        relay.broker.cache().get(&Symbol::parse("NVDA").unwrap()),
        Some(Decimal::from_str("900.5").unwrap())
    );
}

#[test]
fn live_join_without_cached_price_sends_empty_snapshot() {
    let upstream = Arc::new(RecordingUpstream::default());
    let relay = setup(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        upstream.clone(),
    ));
    let (session, mut rx) = relay.lifecycle.open();

    assert!(session.join("AAPL"));

    let snapshot = rx.try_recv().unwrap();
    assert_eq!(snapshot.symbol.as_str(), "AAPL");
    assert_eq!(snapshot.price, None);
    assert_eq!(*upstream.requests.lock(), vec!["+AAPL"]);
}

#[test]
fn upstream_is_asked_once_per_topic() {
    let upstream = Arc::new(RecordingUpstream::default());
    let relay = setup(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        upstream.clone(),
    ));
    let (first, _rx1) = relay.lifecycle.open();
    let (second, _rx2) = relay.lifecycle.open();

    first.join("AAPL");
    second.join("AAPL");
    first.join("AAPL");
    first.leave("AAPL");
    second.leave("AAPL");

    assert_eq!(*upstream.requests.lock(), vec!["+AAPL", "-AAPL"]);
}

#[test]
fn closing_a_session_releases_all_topics() {
    let upstream = Arc::new(RecordingUpstream::default());
    let relay = setup(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        upstream.clone(),
    ));
    let (staying, _rx1) = relay.lifecycle.open();
    let (leaving, _rx2) = relay.lifecycle.open();

    staying.join("AAPL");
    leaving.join("AAPL");
    leaving.join("TSLA");
    assert_eq!(relay.publisher.stats().outboxes, 2);

    drop(leaving);

    let stats = relay.broker.stats();
    assert_eq!(stats.subscriber_count, 1);
    assert_eq!(stats.topic_count, 1);
    assert_eq!(relay.publisher.stats().outboxes, 1);
    assert_eq!(*upstream.requests.lock(), vec!["+AAPL", "+TSLA", "-TSLA"]);
}

#[test]
fn close_is_idempotent() {
    let upstream = Arc::new(RecordingUpstream::default());
    let relay = setup(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        upstream.clone(),
    ));
    let (session, _rx) = relay.lifecycle.open();
    session.join("AAPL");

    assert!(session.close());
    assert!(!session.close());
    drop(session);

    assert_eq!(*upstream.requests.lock(), vec!["+AAPL", "-AAPL"]);
    assert_eq!(relay.broker.stats().subscriber_count, 0);
}

#[test]
fn invalid_symbols_are_ignored() {
    let upstream = Arc::new(RecordingUpstream::default());
    let relay = setup(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        upstream.clone(),
    ));
    let (session, mut rx) = relay.lifecycle.open();

    assert!(!session.join("   "));
    session.leave("");

    assert!(rx.try_recv().is_err());
    assert!(upstream.requests.lock().is_empty());
    assert_eq!(relay.broker.stats().topic_count, 0);
}
