//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ConfigError, Credentials, FeedMode, RelayConfig, ServerSettings, SyntheticSettings,
    UpstreamSettings,
};
