//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded once from environment variables
//! at startup.

use std::time::Duration;

use reqwest::Url;

/// Finnhub API credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Wrap an API key. Returns `None` for an empty or blank key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Option<Self> {
        let api_key = api_key.into().trim().to_string();
        (!api_key.is_empty()).then_some(Self { api_key })
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Source of ticks, selected by the presence of an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMode {
    /// Upstream Finnhub feed.
    Live(Credentials),
    /// Local random walk.
    Synthetic,
}

impl FeedMode {
    /// Mode name used in logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Synthetic => "synthetic",
        }
    }

    /// Credential, when live.
    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Live(credentials) => Some(credentials),
            Self::Synthetic => None,
        }
    }
}

/// Upstream endpoints and connection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSettings {
    /// WebSocket feed base URL; the token is appended as a query parameter.
    pub ws_url: String,
    /// REST API base URL for history.
    pub rest_url: String,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Reconnect jitter as a fraction of the delay.
    pub reconnect_jitter: f64,
    /// Timeout for history requests.
    pub history_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.finnhub.io".to_string(),
            rest_url: "https://finnhub.io/api/v1".to_string(),
            reconnect_delay: Duration::from_millis(3000),
            reconnect_jitter: 0.0,
            history_timeout: Duration::from_millis(8000),
        }
    }
}

/// Synthetic generator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSettings {
    /// Interval between generator ticks.
    pub tick_interval: Duration,
    /// Volatility of live synthetic ticks.
    pub tick_volatility: f64,
    /// Volatility of synthetic history points.
    pub history_volatility: f64,
    /// Length of synthetic history series.
    pub history_points: usize,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            tick_volatility: 0.01,
            history_volatility: 0.015,
            history_points: 300,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Subscriber WebSocket and history HTTP port.
    pub api_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
    /// Capacity of each subscriber outbox.
    pub subscriber_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_port: 4000,
            health_port: 8082,
            subscriber_queue: 256,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Live or synthetic.
    pub mode: FeedMode,
    /// Upstream settings (unused in synthetic mode).
    pub upstream: UpstreamSettings,
    /// Synthetic generator settings.
    pub synthetic: SyntheticSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL has the wrong scheme.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mode = lookup("FINNHUB_KEY")
            .and_then(Credentials::new)
            .map_or(FeedMode::Synthetic, FeedMode::Live);

        let upstream_defaults = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            ws_url: lookup("FINNHUB_WS_URL").unwrap_or(upstream_defaults.ws_url),
            rest_url: lookup("FINNHUB_REST_URL").unwrap_or(upstream_defaults.rest_url),
            reconnect_delay: parse_millis(
                lookup("RELAY_RECONNECT_DELAY_MS"),
                upstream_defaults.reconnect_delay,
            ),
            reconnect_jitter: parse_or(
                lookup("RELAY_RECONNECT_JITTER"),
                upstream_defaults.reconnect_jitter,
            ),
            history_timeout: parse_millis(
                lookup("RELAY_HISTORY_TIMEOUT_MS"),
                upstream_defaults.history_timeout,
            ),
        };
        require_scheme("FINNHUB_WS_URL", &upstream.ws_url, &["ws://", "wss://"])?;
        require_scheme("FINNHUB_REST_URL", &upstream.rest_url, &["http://", "https://"])?;

        let synthetic_defaults = SyntheticSettings::default();
        let synthetic = SyntheticSettings {
            tick_interval: parse_millis(
                lookup("RELAY_TICK_INTERVAL_MS"),
                synthetic_defaults.tick_interval,
            ),
            tick_volatility: parse_or(
                lookup("RELAY_TICK_VOLATILITY"),
                synthetic_defaults.tick_volatility,
            ),
            history_volatility: parse_or(
                lookup("RELAY_HISTORY_VOLATILITY"),
                synthetic_defaults.history_volatility,
            ),
            history_points: parse_or(
                lookup("RELAY_HISTORY_POINTS"),
                synthetic_defaults.history_points,
            ),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            api_port: parse_or(lookup("PORT"), server_defaults.api_port),
            health_port: parse_or(lookup("RELAY_HEALTH_PORT"), server_defaults.health_port),
            subscriber_queue: parse_or(
                lookup("RELAY_SUBSCRIBER_QUEUE"),
                server_defaults.subscriber_queue,
            )
            .max(1),
        };

        Ok(Self {
            mode,
            upstream,
            synthetic,
            server,
        })
    }

    /// Upstream feed URL with the percent-encoded API token attached, if live.
    ///
    /// `None` in synthetic mode, or if `ws_url` was replaced after loading
    /// with something that does not parse.
    #[must_use]
    pub fn feed_url(&self) -> Option<String> {
        let credentials = self.mode.credentials()?;
        let mut url = Url::parse(&self.upstream.ws_url).ok()?;
        url.query_pairs_mut()
            .append_pair("token", credentials.api_key());
        Some(url.into())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// URL does not parse.
    #[error("{key} is not a valid URL ({reason}), got {value:?}")]
    MalformedUrl {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// URL does not use an accepted scheme.
    #[error("{key} must start with one of {expected:?}, got {value:?}")]
    InvalidUrl {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Accepted scheme prefixes.
        expected: &'static [&'static str],
    },
}

fn require_scheme(
    key: &'static str,
    value: &str,
    expected: &'static [&'static str],
) -> Result<(), ConfigError> {
    if !expected.iter().any(|scheme| value.starts_with(scheme)) {
        return Err(ConfigError::InvalidUrl {
            key,
            value: value.to_string(),
            expected,
        });
    }
    Url::parse(value)
        .map(drop)
        .map_err(|e| ConfigError::MalformedUrl {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Zero is rejected like a malformed value; timers and backoff need a
/// positive period.
fn parse_millis(raw: Option<String>, default: Duration) -> Duration {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&ms| ms > 0)
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn missing_key_selects_synthetic_mode() {
        let config = config(&[]).unwrap();
        assert_eq!(config.mode, FeedMode::Synthetic);
        assert!(config.feed_url().is_none());
    }

    #[test]
    fn blank_key_selects_synthetic_mode() {
        let config = config(&[("FINNHUB_KEY", "   ")]).unwrap();
        assert_eq!(config.mode, FeedMode::Synthetic);
    }

    #[test]
    fn key_selects_live_mode_and_builds_feed_url() {
        let config = config(&[("FINNHUB_KEY", "abc123")]).unwrap();
        assert_eq!(config.mode.as_str(), "live");
        assert_eq!(
            config.feed_url().as_deref(),
            Some("wss://ws.finnhub.io/?token=abc123")
        );
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config(&[]).unwrap();
        assert_eq!(config.server.api_port, 4000);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.server.subscriber_queue, 256);
        assert_eq!(config.upstream.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.upstream.history_timeout, Duration::from_secs(8));
        assert_eq!(config.synthetic.tick_interval, Duration::from_secs(1));
        assert_eq!(config.synthetic.history_points, 300);
        assert!((config.synthetic.tick_volatility - 0.01).abs() < f64::EPSILON);
        assert!((config.synthetic.history_volatility - 0.015).abs() < f64::EPSILON);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("PORT", "5000"),
            ("RELAY_RECONNECT_DELAY_MS", "250"),
            ("RELAY_TICK_INTERVAL_MS", "100"),
            ("FINNHUB_WS_URL", "ws://127.0.0.1:9001/feed?x=1"),
            ("FINNHUB_KEY", "k"),
        ])
        .unwrap();

        assert_eq!(config.server.api_port, 5000);
        assert_eq!(config.upstream.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.synthetic.tick_interval, Duration::from_millis(100));
        assert_eq!(
            config.feed_url().as_deref(),
            Some("ws://127.0.0.1:9001/feed?x=1&token=k")
        );
    }

    #[test]
    fn feed_token_is_percent_encoded() {
        let config = config(&[("FINNHUB_KEY", "a b&c=d#e")]).unwrap();
        assert_eq!(
            config.feed_url().as_deref(),
            Some("wss://ws.finnhub.io/?token=a+b%26c%3Dd%23e")
        );
    }

    #[test]
    fn unparseable_url_is_rejected() {
        let err = config(&[("FINNHUB_WS_URL", "ws://")]).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedUrl { key: "FINNHUB_WS_URL", .. }));
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let config = config(&[
            ("RELAY_TICK_INTERVAL_MS", "0"),
            ("RELAY_RECONNECT_DELAY_MS", "0"),
            ("RELAY_HISTORY_TIMEOUT_MS", "0"),
        ])
        .unwrap();

        assert_eq!(config.synthetic.tick_interval, Duration::from_secs(1));
        assert_eq!(config.upstream.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.upstream.history_timeout, Duration::from_secs(8));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = config(&[("PORT", "not-a-port"), ("RELAY_SUBSCRIBER_QUEUE", "0")]).unwrap();
        assert_eq!(config.server.api_port, 4000);
        assert_eq!(config.server.subscriber_queue, 1);
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        let err = config(&[("FINNHUB_WS_URL", "https://ws.finnhub.io")]).unwrap_err();
        assert!(err.to_string().contains("FINNHUB_WS_URL"));

        assert!(config(&[("FINNHUB_REST_URL", "ftp://finnhub.io")]).is_err());
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123").unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
