//! Subscription Tracking
//!
//! Domain types for tracking which subscribers are joined to which symbol
//! topics.
//!
//! # Design
//!
//! The subscription table keeps two indexes that always agree:
//! - topic membership: symbol → set of subscriber IDs
//! - subscriber topics: subscriber ID → set of symbols
//!
//! A pair `(symbol, id)` is present in both or in neither. Empty sets are
//! removed as soon as they become empty, so the presence of a symbol key
//! means at least one subscriber is joined. The first member arriving and
//! the last member leaving are reported to the caller, which turns them into
//! upstream subscribe/unsubscribe requests.
//!
//! Membership uses set semantics: a subscriber joining a symbol twice is
//! still one member.

use std::collections::{HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

use super::streaming::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for one live subscriber connection.
///
/// Backed by a random v4 UUID, so IDs are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh subscriber ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an ID from a fixed UUID (useful for deterministic tests).
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of adding a subscriber to a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The topic had no members before; upstream must be subscribed.
    FirstMember,
    /// The topic already had other members.
    Joined,
    /// The subscriber was already a member; nothing changed.
    AlreadyMember,
}

/// Result of removing a subscriber from a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The topic is now empty; upstream must be unsubscribed.
    LastMember,
    /// Other members remain.
    Left,
    /// The subscriber was not a member; nothing changed.
    NotMember,
}

// =============================================================================
// Subscription Table
// =============================================================================

/// Bidirectional topic membership table.
///
/// Not internally synchronized; the owner serializes access.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    /// Map from symbol to the subscribers joined to it.
    topic_members: HashMap<Symbol, HashSet<SubscriberId>>,
    /// Map from subscriber to the symbols it joined.
    subscriber_topics: HashMap<SubscriberId, HashSet<Symbol>>,
}

impl SubscriptionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` to the topic for `symbol`.
    pub fn join(&mut self, subscriber: SubscriberId, symbol: &Symbol) -> JoinOutcome {
        let topics = self.subscriber_topics.entry(subscriber).or_default();
        if !topics.insert(symbol.clone()) {
            return JoinOutcome::AlreadyMember;
        }

        let members = self.topic_members.entry(symbol.clone()).or_default();
        members.insert(subscriber);

        if members.len() == 1 {
            JoinOutcome::FirstMember
        } else {
            JoinOutcome::Joined
        }
    }

    /// Remove `subscriber` from the topic for `symbol`.
    pub fn leave(&mut self, subscriber: SubscriberId, symbol: &Symbol) -> LeaveOutcome {
        let Some(topics) = self.subscriber_topics.get_mut(&subscriber) else {
            return LeaveOutcome::NotMember;
        };
        if !topics.remove(symbol) {
            return LeaveOutcome::NotMember;
        }
        if topics.is_empty() {
            self.subscriber_topics.remove(&subscriber);
        }

        self.remove_member(subscriber, symbol)
    }

    /// Remove `subscriber` from every topic it joined.
    ///
    /// Returns the symbols whose topics became empty. Unknown subscribers
    /// yield an empty list.
    pub fn remove_subscriber(&mut self, subscriber: SubscriberId) -> Vec<Symbol> {
        let Some(topics) = self.subscriber_topics.remove(&subscriber) else {
            return vec![];
        };

        topics
            .into_iter()
            .filter(|symbol| self.remove_member(subscriber, symbol) == LeaveOutcome::LastMember)
            .collect()
    }

    fn remove_member(&mut self, subscriber: SubscriberId, symbol: &Symbol) -> LeaveOutcome {
        let Some(members) = self.topic_members.get_mut(symbol) else {
            return LeaveOutcome::NotMember;
        };
        if !members.remove(&subscriber) {
            return LeaveOutcome::NotMember;
        }
        if members.is_empty() {
            self.topic_members.remove(symbol);
            LeaveOutcome::LastMember
        } else {
            LeaveOutcome::Left
        }
    }

    /// Subscribers currently joined to `symbol`.
    #[must_use]
    pub fn members(&self, symbol: &Symbol) -> Vec<SubscriberId> {
        self.topic_members
            .get(symbol)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Symbols `subscriber` is joined to.
    #[must_use]
    pub fn topics(&self, subscriber: SubscriberId) -> Vec<Symbol> {
        self.subscriber_topics
            .get(&subscriber)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Symbols with at least one member.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.topic_members.keys().cloned().collect()
    }

    /// Whether `symbol` has at least one member.
    #[must_use]
    pub fn is_active(&self, symbol: &Symbol) -> bool {
        self.topic_members.contains_key(symbol)
    }

    /// Table statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            topic_count: self.topic_members.len(),
            subscriber_count: self.subscriber_topics.len(),
        }
    }

    /// Check that both indexes agree and hold no empty sets.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.topic_members.iter().all(|(symbol, members)| {
            !members.is_empty()
                && members.iter().all(|id| {
                    self.subscriber_topics
                        .get(id)
                        .is_some_and(|topics| topics.contains(symbol))
                })
        });

        let reverse_ok = self.subscriber_topics.iter().all(|(id, topics)| {
            !topics.is_empty()
                && topics.iter().all(|symbol| {
                    self.topic_members
                        .get(symbol)
                        .is_some_and(|members| members.contains(id))
                })
        });

        forward_ok && reverse_ok
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Subscription table statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of symbols with at least one member.
    pub topic_count: usize,
    /// Number of subscribers joined to at least one symbol.
    pub subscriber_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
