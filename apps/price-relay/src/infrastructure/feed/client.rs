//! Finnhub WebSocket Client
//!
//! Owns the single upstream connection. Inbound trades are decoded into
//! ticks and emitted as [`FeedEvent`]s; subscribe/unsubscribe requests from
//! the broker arrive through a [`FeedHandle`].
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected
//!      ▲               │              │
//!      └── delay ◄─────┴── error ◄────┘ (read error or close)
//! ```
//!
//! There is no terminal failure state. Only cancellation stops the loop.
//!
//! # Reconciliation
//!
//! On entering `Connected` the client discards control requests left over
//! from the previous session, then sends one subscribe frame per symbol that
//! currently has subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FeedCodec};
use super::messages::ControlFrame;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{TopicDirectory, UpstreamPort};
use crate::domain::streaming::{Symbol, Tick};
use crate::infrastructure::metrics::{self, ControlAction};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one upstream session.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Connection State
// =============================================================================

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection; waiting to reconnect.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and streaming.
    Connected,
}

impl ConnectionState {
    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Shared view of the upstream connection, read by the handle and health.
#[derive(Debug)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    reconnect_attempts: AtomicU64,
    ticks_received: AtomicU64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// Create a state starting `Disconnected`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            reconnect_attempts: AtomicU64::new(0),
            ticks_received: AtomicU64::new(0),
        }
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
        }
        metrics::set_upstream_connected(state == ConnectionState::Connected);
    }

    /// Current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.get_state() == ConnectionState::Connected
    }

    /// Time of the most recent successful connection.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn add_ticks(&self, count: u64) {
        self.ticks_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Total reconnection attempts since startup.
    #[must_use]
    pub fn get_reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Total ticks decoded since startup.
    #[must_use]
    pub fn get_ticks_received(&self) -> u64 {
        self.ticks_received.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Connected and reconciled.
    Connected,
    /// Connection lost.
    Disconnected,
    /// A decoded trade.
    Tick(Tick),
    /// Error message reported by the feed.
    Error(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Clone)]
pub struct FeedClientConfig {
    /// Full WebSocket URL including the token.
    pub url: String,
    /// Reconnection behavior.
    pub reconnect: ReconnectConfig,
}

impl FeedClientConfig {
    /// Create a configuration with the default reconnect policy.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// URL with the query string (and so the token) removed, for logs.
    #[must_use]
    pub fn redacted_url(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

impl std::fmt::Debug for FeedClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClientConfig")
            .field("url", &self.redacted_url())
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable request side of the feed client.
///
/// Requests are dropped unless the connection is established; the next
/// reconciliation covers anything missed while disconnected.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    state: Arc<FeedState>,
    commands: mpsc::UnboundedSender<ControlFrame>,
}

impl FeedHandle {
    fn enqueue(&self, frame: ControlFrame) {
        if !self.state.is_connected() {
            tracing::debug!(symbol = %frame.symbol, kind = ?frame.kind, "Upstream not connected, dropping control request");
            return;
        }
        if self.commands.send(frame).is_err() {
            tracing::debug!("Feed client stopped, dropping control request");
        }
    }
}

impl UpstreamPort for FeedHandle {
    fn request_subscribe(&self, symbol: &Symbol) {
        self.enqueue(ControlFrame::subscribe(symbol.clone()));
    }

    fn request_unsubscribe(&self, symbol: &Symbol) {
        self.enqueue(ControlFrame::unsubscribe(symbol.clone()));
    }
}

// =============================================================================
// Client
// =============================================================================

/// Finnhub WebSocket client.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: FeedCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    state: Arc<FeedState>,
    command_tx: mpsc::UnboundedSender<ControlFrame>,
    command_rx: mpsc::UnboundedReceiver<ControlFrame>,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            config,
            codec: FeedCodec::new(),
            event_tx,
            cancel,
            state: Arc::new(FeedState::new()),
            command_tx,
            command_rx,
        }
    }

    /// Request handle for the broker.
    #[must_use]
    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            state: Arc::clone(&self.state),
            commands: self.command_tx.clone(),
        }
    }

    /// Shared connection state.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run the connection loop until cancelled.
    ///
    /// `directory` supplies the active symbols re-subscribed on every
    /// (re)connect.
    pub async fn run(mut self, directory: Arc<dyn TopicDirectory>) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.set_state(ConnectionState::Connecting);
            let result = self.connect_and_run(directory.as_ref(), &mut policy).await;
            self.state.set_state(ConnectionState::Disconnected);

            match result {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream connection lost");
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;
                }
            }

            let delay = policy.next_delay();
            self.state.increment_reconnect_attempts();
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to upstream feed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Feed client stopped");
    }

    /// Connect, reconcile, and pump frames until error or cancellation.
    ///
    /// Returns `Ok(())` only when cancelled.
    async fn connect_and_run(
        &mut self,
        directory: &dyn TopicDirectory,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.redacted_url(), "Connecting to upstream feed");

        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        let mut stale = 0_usize;
        while self.command_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "Discarded control requests from previous session");
        }

        self.state.set_state(ConnectionState::Connected);
        policy.reset();

        let active = directory.active_symbols();
        tracing::info!(symbols = active.len(), "Upstream connected, reconciling subscriptions");
        for symbol in active {
            self.send_control(&mut write, &ControlFrame::subscribe(symbol))
                .await;
        }
        let _ = self.event_tx.send(FeedEvent::Connected).await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(frame) = self.command_rx.recv() => {
                    self.send_control(&mut write, &frame).await;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(text.as_str()).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Upstream sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_parse_error();
                tracing::warn!(error = %e, "Dropping unparseable upstream frame");
                return;
            }
        };

        for rejected in &frame.rejected {
            metrics::record_parse_error();
            tracing::warn!(error = %rejected, "Skipping malformed trade record");
        }

        if let Some(msg) = frame.feed_error {
            tracing::warn!(%msg, "Upstream reported an error");
            let _ = self.event_tx.send(FeedEvent::Error(msg)).await;
        }

        self.state.add_ticks(frame.ticks.len() as u64);
        for tick in frame.ticks {
            if self.event_tx.send(FeedEvent::Tick(tick)).await.is_err() {
                tracing::debug!("Feed event receiver dropped");
                return;
            }
        }
    }

    /// Send one control frame. Failures are logged; the read side notices a
    /// dead connection.
    async fn send_control<W>(&self, write: &mut W, frame: &ControlFrame)
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let json = match self.codec.encode(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode control frame");
                return;
            }
        };

        match write.send(Message::Text(json.into())).await {
            Ok(()) => {
                metrics::record_control_frame(match frame.kind {
                    super::messages::ControlKind::Subscribe => ControlAction::Subscribe,
                    super::messages::ControlKind::Unsubscribe => ControlAction::Unsubscribe,
                });
                tracing::debug!(symbol = %frame.symbol, kind = ?frame.kind, "Sent control frame");
            }
            Err(e) => {
                tracing::warn!(symbol = %frame.symbol, error = %e, "Failed to send control frame");
            }
        }
    }
}
