//! Price history lookups with a synthetic fallback.
//!
//! A configured upstream source is tried first under a timeout. Any failure
//! (including the timeout) falls back to a locally generated random walk, so
//! callers always receive a well-formed series.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::application::ports::{HistoryError, HistoryPort};
use crate::domain::pricing::{PriceCache, random_price, random_walk_step};
use crate::domain::streaming::{HistoryPoint, Symbol, now_millis};
use crate::infrastructure::metrics::{self, HistoryOutcome};

/// Symbol used when the request names none (or an invalid one).
pub const DEFAULT_HISTORY_SYMBOL: &str = "AAPL";

/// Range used when the request names none.
pub const DEFAULT_HISTORY_RANGE: &str = "1d";

/// Spacing between synthetic history points.
const SYNTHETIC_STEP_MS: i64 = 60_000;

/// Upper bound of a random history seed when the symbol has no cached price.
const SYNTHETIC_SEED_MAX: f64 = 300.0;

/// History lookup settings.
#[derive(Debug, Clone, Copy)]
pub struct HistorySettings {
    /// Upstream request timeout.
    pub timeout: Duration,
    /// Number of synthetic points.
    pub points: usize,
    /// Random-walk volatility for synthetic points.
    pub volatility: f64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            points: 300,
            volatility: 0.015,
        }
    }
}

/// Response body of the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryResponse {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Requested range, echoed back.
    pub range: String,
    /// Oldest point first.
    pub history: Vec<HistoryPoint>,
}

/// Serves price history.
pub struct HistoryService {
    source: Option<Arc<dyn HistoryPort>>,
    cache: Arc<PriceCache>,
    settings: HistorySettings,
}

impl HistoryService {
    /// Create a service. `source` is `None` in synthetic mode.
    #[must_use]
    pub fn new(
        source: Option<Arc<dyn HistoryPort>>,
        cache: Arc<PriceCache>,
        settings: HistorySettings,
    ) -> Self {
        Self {
            source,
            cache,
            settings,
        }
    }

    /// Look up history for the requested symbol and range.
    ///
    /// Never fails: upstream errors are logged and replaced by synthetic data.
    pub async fn history(&self, symbol: Option<&str>, range: Option<&str>) -> HistoryResponse {
        let symbol = symbol
            .and_then(Symbol::parse)
            .unwrap_or_else(|| Symbol::from_static(DEFAULT_HISTORY_SYMBOL));
        let range = range
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_HISTORY_RANGE)
            .to_string();

        if let Some(source) = &self.source {
            match self.fetch_upstream(source.as_ref(), &symbol, &range).await {
                Ok(history) => {
                    metrics::record_history_request(HistoryOutcome::Upstream);
                    return HistoryResponse {
                        symbol,
                        range,
                        history,
                    };
                }
                Err(e) => {
                    tracing::warn!(%symbol, %range, error = %e, "History fetch failed, using synthetic history");
                    metrics::record_history_request(HistoryOutcome::Fallback);
                }
            }
        } else {
            metrics::record_history_request(HistoryOutcome::Synthetic);
        }

        let seed = self.cache.get(&symbol).unwrap_or_else(|| {
            random_price(0.0, SYNTHETIC_SEED_MAX, &mut rand::rng())
        });
        let history = synthetic_history(
            seed,
            self.settings.points,
            self.settings.volatility,
            now_millis(),
            &mut rand::rng(),
        );

        HistoryResponse {
            symbol,
            range,
            history,
        }
    }

    async fn fetch_upstream(
        &self,
        source: &dyn HistoryPort,
        symbol: &Symbol,
        range: &str,
    ) -> Result<Vec<HistoryPoint>, HistoryError> {
        let timeout = self.settings.timeout;
        tokio::time::timeout(timeout, source.fetch_history(symbol, range))
            .await
            .map_err(|_| {
                HistoryError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            })?
    }
}

/// Generate `points` history points spaced one minute apart, ending at
/// `now_ms`, each one random-walk step from the previous one.
pub fn synthetic_history<R: Rng + ?Sized>(
    seed: Decimal,
    points: usize,
    volatility: f64,
    now_ms: i64,
    rng: &mut R,
) -> Vec<HistoryPoint> {
    let mut price = seed;
    (0..points)
        .rev()
        .map(|age| {
            price = random_walk_step(price, volatility, rng);
            let offset = i64::try_from(age).unwrap_or(i64::MAX / SYNTHETIC_STEP_MS);
            HistoryPoint {
                t: now_ms - offset * SYNTHETIC_STEP_MS,
                price,
            }
        })
        .collect()
}
