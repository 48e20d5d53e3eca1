//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: ticks received by source, updates delivered and dropped
//! - **Upstream**: reconnects, parse errors, control frames sent
//! - **Subscriptions**: active subscriber and topic counts
//! - **History**: history requests by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::SubscriptionStats;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder has already been installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_relay_ticks_received_total",
        "Total ticks received, by source"
    );
    describe_counter!(
        "price_relay_updates_delivered_total",
        "Total price updates queued to subscriber outboxes"
    );
    describe_counter!(
        "price_relay_updates_dropped_total",
        "Total price updates dropped because an outbox was full or closed"
    );

    describe_counter!(
        "price_relay_upstream_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_counter!(
        "price_relay_upstream_parse_errors_total",
        "Total upstream frames or records that failed to parse"
    );
    describe_counter!(
        "price_relay_upstream_control_frames_total",
        "Total upstream control frames sent, by action"
    );
    describe_gauge!(
        "price_relay_upstream_connected",
        "1 when the upstream feed is connected, 0 otherwise"
    );

    describe_gauge!(
        "price_relay_subscribers",
        "Number of subscribers joined to at least one topic"
    );
    describe_gauge!(
        "price_relay_topics",
        "Number of symbols with at least one subscriber"
    );

    describe_counter!(
        "price_relay_history_requests_total",
        "Total history requests, by outcome"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Where a tick came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    /// Upstream feed.
    Upstream,
    /// Local random-walk generator.
    Synthetic,
}

impl TickSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Synthetic => "synthetic",
        }
    }
}

/// Upstream control frame action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Subscribe frame.
    Subscribe,
    /// Unsubscribe frame.
    Unsubscribe,
}

impl ControlAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// How a history request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// Upstream series returned.
    Upstream,
    /// Upstream failed; synthetic series returned.
    Fallback,
    /// No upstream configured.
    Synthetic,
}

impl HistoryOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Fallback => "fallback",
            Self::Synthetic => "synthetic",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a tick entering the relay.
pub fn record_tick_received(source: TickSource) {
    counter!(
        "price_relay_ticks_received_total",
        "source" => source.as_str()
    )
    .increment(1);
}

/// Record updates queued to subscribers.
pub fn record_updates_delivered(count: u64) {
    counter!("price_relay_updates_delivered_total").increment(count);
}

/// Record updates dropped for slow or gone subscribers.
pub fn record_updates_dropped(count: u64) {
    counter!("price_relay_updates_dropped_total").increment(count);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("price_relay_upstream_reconnects_total").increment(1);
}

/// Record an upstream frame or record that failed to parse.
pub fn record_parse_error() {
    counter!("price_relay_upstream_parse_errors_total").increment(1);
}

/// Record a control frame sent upstream.
pub fn record_control_frame(action: ControlAction) {
    counter!(
        "price_relay_upstream_control_frames_total",
        "action" => action.as_str()
    )
    .increment(1);
}

/// Update the upstream connection gauge.
pub fn set_upstream_connected(connected: bool) {
    gauge!("price_relay_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update subscriber and topic gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscription_stats(stats: SubscriptionStats) {
    gauge!("price_relay_subscribers").set(stats.subscriber_count as f64);
    gauge!("price_relay_topics").set(stats.topic_count as f64);
}

/// Record how a history request was answered.
pub fn record_history_request(outcome: HistoryOutcome) {
    counter!(
        "price_relay_history_requests_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
