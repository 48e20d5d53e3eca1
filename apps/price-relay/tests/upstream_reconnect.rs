//! Upstream Feed Integration Tests
//!
//! Runs the feed client against a local WebSocket server to check
//! reconnect reconciliation, live control frames, and trade decoding.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use price_relay::domain::subscription::SubscriberId;
use price_relay::{
    FeedClient, FeedClientConfig, FeedEvent, PriceCache, ReconnectConfig, SubscriptionBroker,
};

const WAIT: Duration = Duration::from_secs(5);

/// Control frame as `(type, symbol)`.
type Control = (String, String);

fn parse_control(text: &str) -> Control {
    let value: Value = serde_json::from_str(text).unwrap();
    (
        value["type"].as_str().unwrap().to_string(),
        value["symbol"].as_str().unwrap().to_string(),
    )
}

async fn next_control<S>(ws: &mut S) -> Control
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => return parse_control(text.as_str()),
            Some(Ok(_)) => {}
            other => panic!("connection ended: {other:?}"),
        }
    }
}

async fn next_connected(events: &mut mpsc::Receiver<FeedEvent>) {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap() {
            Some(FeedEvent::Connected) => return,
            Some(_) => {}
            None => panic!("feed events closed"),
        }
    }
}

fn subscribe(symbol: &str) -> Control {
    ("subscribe".to_string(), symbol.to_string())
}

#[tokio::test]
async fn reconnect_resubscribes_active_symbols_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<(usize, Control)>();

    let server = tokio::spawn(async move {
        // First connection: take the reconciliation frames, then drop it.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for _ in 0..2 {
            frames_tx.send((1, next_control(&mut ws).await)).unwrap();
        }
        drop(ws);

        // Second connection: push a trade, then report every control frame.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let trade = r#"{"type":"trade","data":[{"s":"AAPL","p":191.5,"t":1700000000000,"v":10}]}"#;
        ws.send(Message::Text(trade.to_string().into())).await.unwrap();
        loop {
            let frame = next_control(&mut ws).await;
            let done = frame == ("unsubscribe".to_string(), "NVDA".to_string());
            frames_tx.send((2, frame)).unwrap();
            if done {
                break;
            }
        }
    });

    let cancel = CancellationToken::new();
    let (event_tx, mut events) = mpsc::channel(64);
    let config = FeedClientConfig {
        url: format!("ws://{addr}"),
        reconnect: ReconnectConfig::fixed(Duration::from_millis(50)),
    };
    let client = FeedClient::new(config, event_tx, cancel.clone());
    let broker = Arc::new(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        Arc::new(client.handle()),
    ));

    // Membership before the feed is up: two active topics, one abandoned.
    let (alice, bob) = (SubscriberId::generate(), SubscriberId::generate());
    broker.join(alice, "AAPL");
    broker.join(bob, "MSFT");
    broker.join(bob, "TSLA");
    broker.leave(bob, "TSLA");

    let feed_state = client.state();
    let client_task = tokio::spawn(client.run(broker.clone()));

    next_connected(&mut events).await;
    next_connected(&mut events).await;
    assert!(feed_state.is_connected());
    assert!(feed_state.get_reconnect_attempts() >= 1);

    // A new topic on the live connection, then its removal.
    let carol = SubscriberId::generate();
    broker.join(carol, "NVDA");
    broker.leave(carol, "NVDA");

    timeout(WAIT, server).await.unwrap().unwrap();

    let mut first = BTreeSet::new();
    let mut second = Vec::new();
    while let Ok((connection, frame)) = frames_rx.try_recv() {
        if connection == 1 {
            first.insert(frame);
        } else {
            second.push(frame);
        }
    }

    let active: BTreeSet<_> = [subscribe("AAPL"), subscribe("MSFT")].into();
    assert_eq!(first, active);

    let reconciled: BTreeSet<_> = second[..2].iter().cloned().collect();
    assert_eq!(second.len(), 4, "unexpected frames: {second:?}");
    assert_eq!(reconciled, active);
    assert_eq!(second[2], subscribe("NVDA"));
    assert_eq!(second[3], ("unsubscribe".to_string(), "NVDA".to_string()));

    cancel.cancel();
    timeout(WAIT, client_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn trades_are_emitted_as_ticks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in [
            r#"{"type":"ping"}"#,
            r#"not json"#,
            r#"{"type":"trade","data":[{"s":"MSFT","p":410.25,"t":1700000000000},{"s":"","p":1.0}]}"#,
        ] {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }
        // Hold the connection open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let cancel = CancellationToken::new();
    let (event_tx, mut events) = mpsc::channel(64);
    let client = FeedClient::new(
        FeedClientConfig::new(format!("ws://{addr}")),
        event_tx,
        cancel.clone(),
    );
    let broker = Arc::new(SubscriptionBroker::live(
        Arc::new(PriceCache::new()),
        Arc::new(client.handle()),
    ));
    let feed_state = client.state();
    let client_task = tokio::spawn(client.run(broker));

    let tick = loop {
        match timeout(WAIT, events.recv()).await.unwrap() {
            Some(FeedEvent::Tick(tick)) => break tick,
            Some(_) => {}
            None => panic!("feed events closed"),
        }
    };
    assert_eq!(tick.symbol.as_str(), "MSFT");
    assert_eq!(tick.price.to_string(), "410.25");
    assert_eq!(tick.timestamp_ms, 1_700_000_000_000);
    assert_eq!(feed_state.get_ticks_received(), 1);

    cancel.cancel();
    timeout(WAIT, client_task).await.unwrap().unwrap();
    timeout(WAIT, server).await.unwrap().unwrap();
}
