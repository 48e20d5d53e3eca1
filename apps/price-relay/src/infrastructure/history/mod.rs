//! Finnhub REST History Client
//!
//! Fetches candle closes from `GET {base}/stock/candle` and maps them to
//! history points.
//!
//! # Range Windows
//!
//! | Range | Window      | Resolution |
//! |-------|-------------|------------|
//! | `1d`  | last 6 h    | `1`        |
//! | `5d`  | last 5 days | `60`       |
//! | `1m`  | last 30 days| `60`       |
//! | other | last 6 h    | `1`        |

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{HistoryError, HistoryPort};
use crate::domain::streaming::{HistoryPoint, Symbol};
use crate::infrastructure::config::Credentials;

const HOUR_SECS: i64 = 60 * 60;
const DAY_SECS: i64 = 24 * HOUR_SECS;

/// Time window and resolution for one candle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleWindow {
    /// Window start, epoch seconds.
    pub from: i64,
    /// Window end, epoch seconds.
    pub to: i64,
    /// Candle resolution in minutes.
    pub resolution: &'static str,
}

impl CandleWindow {
    /// Window for `range` ending at `now_secs`.
    #[must_use]
    pub fn for_range(range: &str, now_secs: i64) -> Self {
        let (span, resolution) = match range {
            "5d" => (5 * DAY_SECS, "60"),
            "1m" => (30 * DAY_SECS, "60"),
            _ => (6 * HOUR_SECS, "1"),
        };
        Self {
            from: now_secs - span,
            to: now_secs,
            resolution,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Close(#[serde(with = "rust_decimal::serde::float")] Decimal);

#[derive(Debug, Deserialize)]
struct CandleResponse {
    s: String,
    #[serde(default)]
    c: Option<Vec<Close>>,
    #[serde(default)]
    t: Option<Vec<i64>>,
}

impl CandleResponse {
    fn into_points(self) -> Result<Vec<HistoryPoint>, HistoryError> {
        if self.s != "ok" {
            return Err(HistoryError::NoData(self.s));
        }
        let (Some(closes), Some(times)) = (self.c, self.t) else {
            return Err(HistoryError::NoData("missing series".to_string()));
        };
        times
            .into_iter()
            .zip(closes)
            .map(|(t, Close(price))| {
                let t = t
                    .checked_mul(1000)
                    .ok_or_else(|| HistoryError::NoData(format!("timestamp out of range: {t}")))?;
                Ok(HistoryPoint { t, price })
            })
            .collect()
    }
}

/// History source backed by the Finnhub REST API.
pub struct FinnhubHistoryClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl FinnhubHistoryClient {
    /// Create a client. `timeout` bounds each HTTP request.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, HistoryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HistoryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn fetch_window(
        &self,
        symbol: &Symbol,
        window: CandleWindow,
    ) -> Result<Vec<HistoryPoint>, HistoryError> {
        let url = format!("{}/stock/candle", self.base_url);
        let (from, to) = (window.from.to_string(), window.to.to_string());
        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.as_str()),
                ("resolution", window.resolution),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("token", self.credentials.api_key()),
            ])
            .send()
            .await
            .map_err(|e| HistoryError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status.as_u16()));
        }

        response
            .json::<CandleResponse>()
            .await
            .map_err(|e| HistoryError::Decode(e.without_url().to_string()))?
            .into_points()
    }
}

#[async_trait]
impl HistoryPort for FinnhubHistoryClient {
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        range: &str,
    ) -> Result<Vec<HistoryPoint>, HistoryError> {
        let window = CandleWindow::for_range(range, chrono::Utc::now().timestamp());
        tracing::debug!(%symbol, range, resolution = window.resolution, "Fetching candle history");
        self.fetch_window(symbol, window).await
    }
}
