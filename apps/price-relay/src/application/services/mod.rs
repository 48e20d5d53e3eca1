//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionBroker`: topic membership and upstream transitions
//! - `TickRelay`: cache update and fan-out for every tick
//! - `ConnectionLifecycle`: per-connection join/leave/close handling
//! - `HistoryService`: history lookups with synthetic fallback

mod broker;
mod history;
mod lifecycle;
mod relay;

pub use broker::{BrokerMode, SubscriptionBroker};
pub use history::{
    DEFAULT_HISTORY_RANGE, DEFAULT_HISTORY_SYMBOL, HistoryResponse, HistoryService,
    HistorySettings, synthetic_history,
};
pub use lifecycle::{ConnectionLifecycle, SubscriberSession};
pub use relay::TickRelay;
