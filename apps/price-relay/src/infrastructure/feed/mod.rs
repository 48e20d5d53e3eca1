//! Upstream Feed Adapter
//!
//! WebSocket client for the Finnhub trade stream.
//!
//! - `client`: connection loop, reconciliation, and the broker-facing handle
//! - `codec`: frame decoding and control frame encoding
//! - `messages`: wire types
//! - `reconnect`: fixed-delay reconnection policy

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;

pub use client::{
    ConnectionState, FeedClient, FeedClientConfig, FeedClientError, FeedEvent, FeedHandle,
    FeedState,
};
pub use codec::{CodecError, FeedCodec};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
