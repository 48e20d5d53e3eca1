//! Connection Lifecycle
//!
//! Binds one subscriber connection's join, leave and disconnect events to
//! the broker and the outbox registry.
//!
//! Cleanup (dropping every membership and removing the outbox) runs exactly
//! once per session: on the first call to [`SubscriberSession::close`], or
//! when the session is dropped without being closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::broker::SubscriptionBroker;
use crate::application::ports::SubscriberOutboxes;
use crate::domain::streaming::PriceUpdate;
use crate::domain::subscription::SubscriberId;

/// Opens subscriber sessions.
#[derive(Clone)]
pub struct ConnectionLifecycle {
    broker: Arc<SubscriptionBroker>,
    outboxes: Arc<dyn SubscriberOutboxes>,
}

impl ConnectionLifecycle {
    /// Create a lifecycle handler.
    #[must_use]
    pub fn new(broker: Arc<SubscriptionBroker>, outboxes: Arc<dyn SubscriberOutboxes>) -> Self {
        Self { broker, outboxes }
    }

    /// Register a new subscriber connection.
    ///
    /// Returns the session handle and the receiving end of its outbox. No
    /// broker state changes until the subscriber joins a topic.
    #[must_use]
    pub fn open(&self) -> (SubscriberSession, mpsc::Receiver<PriceUpdate>) {
        let id = SubscriberId::generate();
        let outbox = self.outboxes.register(id);
        tracing::debug!(subscriber = %id, "Subscriber connected");

        let session = SubscriberSession {
            id,
            broker: Arc::clone(&self.broker),
            outboxes: Arc::clone(&self.outboxes),
            closed: AtomicBool::new(false),
        };
        (session, outbox)
    }

    /// Shared broker.
    #[must_use]
    pub const fn broker(&self) -> &Arc<SubscriptionBroker> {
        &self.broker
    }
}

/// Handle for one live subscriber connection.
pub struct SubscriberSession {
    id: SubscriberId,
    broker: Arc<SubscriptionBroker>,
    outboxes: Arc<dyn SubscriberOutboxes>,
    closed: AtomicBool,
}

impl SubscriberSession {
    /// This session's subscriber ID.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Join a topic and queue the current price snapshot for this subscriber.
    ///
    /// Returns `false` when the symbol is invalid, the session is closed, or
    /// the snapshot could not be queued.
    pub fn join(&self, raw_symbol: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        self.broker
            .join_with(self.id, raw_symbol, |snapshot| {
                self.outboxes.deliver(self.id, snapshot)
            })
            .unwrap_or(false)
    }

    /// Leave a topic.
    pub fn leave(&self, raw_symbol: &str) {
        if !self.is_closed() {
            self.broker.leave(self.id, raw_symbol);
        }
    }

    /// Tear the session down.
    ///
    /// Returns `true` only for the call that performed the cleanup.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.broker.drop_subscriber(self.id);
        self.outboxes.unregister(self.id);
        tracing::debug!(subscriber = %self.id, "Subscriber disconnected");
        true
    }

    /// Whether cleanup has already run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        self.close();
    }
}
