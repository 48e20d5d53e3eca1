//! Price Relay Binary
//!
//! Starts the price relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `FINNHUB_KEY`: Upstream API key; without it the relay runs in synthetic mode
//! - `FINNHUB_WS_URL`: Upstream WebSocket URL (default: <wss://ws.finnhub.io>)
//! - `FINNHUB_REST_URL`: Upstream REST URL (default: <https://finnhub.io/api/v1>)
//! - `PORT`: Subscriber WebSocket and history port (default: 4000)
//! - `RELAY_HEALTH_PORT`: Health check and metrics port (default: 8082)
//! - `RELAY_RECONNECT_DELAY_MS`: Delay between upstream reconnects (default: 3000)
//! - `RELAY_RECONNECT_JITTER`: Reconnect jitter fraction (default: 0)
//! - `RELAY_TICK_INTERVAL_MS`: Synthetic tick interval (default: 1000)
//! - `RELAY_TICK_VOLATILITY`: Synthetic tick volatility (default: 0.01)
//! - `RELAY_HISTORY_VOLATILITY`: Synthetic history volatility (default: 0.015)
//! - `RELAY_HISTORY_POINTS`: Synthetic history length (default: 300)
//! - `RELAY_HISTORY_TIMEOUT_MS`: Upstream history timeout (default: 8000)
//! - `RELAY_SUBSCRIBER_QUEUE`: Per-subscriber outbox capacity (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-relay)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_relay::application::ports::HistoryPort;
use price_relay::infrastructure::history::FinnhubHistoryClient;
use price_relay::infrastructure::telemetry;
use price_relay::{
    ApiServer, ApiState, ConnectionLifecycle, FanoutPublisher, FeedClient, FeedClientConfig,
    FeedEvent, FeedMode, HealthServer, HealthServerState, HistoryService, HistorySettings,
    PriceCache, ReconnectConfig, RelayConfig, SubscriptionBroker, SyntheticGenerator, TickRelay,
    TickSource, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the feed event channel.
const FEED_EVENT_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting price relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let cache = Arc::new(PriceCache::new());
    let mut tasks = Vec::new();

    // Upstream feed client (live mode only); the broker needs its handle.
    let (feed_client, feed_events) = match config.feed_url() {
        Some(url) => {
            let feed_config = FeedClientConfig {
                url,
                reconnect: ReconnectConfig {
                    delay: config.upstream.reconnect_delay,
                    jitter_factor: config.upstream.reconnect_jitter,
                },
            };
            let (event_tx, event_rx) = mpsc::channel(FEED_EVENT_CAPACITY);
            let client = FeedClient::new(feed_config, event_tx, shutdown_token.clone());
            (Some(client), Some(event_rx))
        }
        None => (None, None),
    };

    let broker = Arc::new(match &feed_client {
        Some(client) => SubscriptionBroker::live(Arc::clone(&cache), Arc::new(client.handle())),
        None => SubscriptionBroker::synthetic(Arc::clone(&cache)),
    });
    let publisher = Arc::new(FanoutPublisher::new(
        broker.clone(),
        config.server.subscriber_queue,
    ));
    let relay = Arc::new(TickRelay::new(Arc::clone(&cache), publisher.clone()));
    let lifecycle = ConnectionLifecycle::new(Arc::clone(&broker), publisher.clone());

    // History service
    let history_source: Option<Arc<dyn HistoryPort>> = match config.mode.credentials() {
        Some(credentials) => Some(Arc::new(FinnhubHistoryClient::new(
            config.upstream.rest_url.clone(),
            credentials.clone(),
            config.upstream.history_timeout,
        )
        .context("failed to build history client")?)),
        None => None,
    };
    let history = Arc::new(HistoryService::new(
        history_source,
        Arc::clone(&cache),
        HistorySettings {
            timeout: config.upstream.history_timeout,
            points: config.synthetic.history_points,
            volatility: config.synthetic.history_volatility,
        },
    ));

    // Tick source
    let feed_state = feed_client.as_ref().map(FeedClient::state);
    if let (Some(client), Some(events)) = (feed_client, feed_events) {
        let event_relay = Arc::clone(&relay);
        tasks.push(tokio::spawn(handle_feed_events(events, event_relay)));

        let directory = broker.clone();
        tasks.push(tokio::spawn(client.run(directory)));
    } else {
        let generator = SyntheticGenerator::from_entropy(
            Arc::clone(&relay),
            config.synthetic.tick_volatility,
        );
        tasks.push(tokio::spawn(
            generator.run(config.synthetic.tick_interval, shutdown_token.clone()),
        ));
    }

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        feed_state,
        Arc::clone(&broker),
        Arc::clone(&publisher),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    }));

    // API server
    let api_state = Arc::new(ApiState { lifecycle, history });
    let api_server = ApiServer::new(config.server.api_port, api_state, shutdown_token.clone());
    let api_shutdown = shutdown_token.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "API server error");
            api_shutdown.cancel();
        }
    }));

    tracing::info!(mode = config.mode.as_str(), "Price relay ready");

    await_shutdown(shutdown_token).await;

    let drain = futures::future::join_all(tasks);
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting"
        );
    }

    tracing::info!("Price relay stopped");
    Ok(())
}

/// Relay events from the upstream feed client.
async fn handle_feed_events(mut rx: mpsc::Receiver<FeedEvent>, relay: Arc<TickRelay>) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Tick(tick) => {
                relay.ingest(&tick, TickSource::Upstream);
            }
            FeedEvent::Connected => {
                tracing::info!("Upstream feed connected");
            }
            FeedEvent::Disconnected => {
                tracing::warn!("Upstream feed disconnected");
            }
            FeedEvent::Error(msg) => {
                tracing::error!(error = %msg, "Upstream feed error");
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        mode = config.mode.as_str(),
        api_port = config.server.api_port,
        health_port = config.server.health_port,
        subscriber_queue = config.server.subscriber_queue,
        "Configuration loaded"
    );
    match config.mode {
        FeedMode::Live(_) => tracing::debug!(
            ws_url = %config.upstream.ws_url,
            rest_url = %config.upstream.rest_url,
            reconnect_delay_ms = config.upstream.reconnect_delay.as_millis(),
            "Upstream endpoints"
        ),
        FeedMode::Synthetic => tracing::warn!(
            tick_interval_ms = config.synthetic.tick_interval.as_millis(),
            "No upstream API key configured, serving synthetic prices"
        ),
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), or for a server to cancel.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Server stopped, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
