//! Market Mirror Binary
//!
//! Mirrors exchange order books over a resilient WebSocket connection
//! and logs top-of-book changes.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-mirror
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `MIRROR_EXCHANGE`: "kalshi" | "polymarket" | "predictfun"
//!   (default: kalshi)
//! - `MIRROR_ENV`: "production" | "demo" (default: production)
//! - `MIRROR_INSTRUMENTS`: Comma-separated instruments to mirror
//! - `MIRROR_WS_URL`: Explicit WebSocket URL override
//! - `MIRROR_API_KEY`: API token for authenticated feeds
//! - `MIRROR_HEARTBEAT_INTERVAL_SECS`: Ping interval (default: 10)
//! - `MIRROR_HEARTBEAT_TIMEOUT_SECS`: Pong timeout (default: 20)
//! - `MIRROR_RECONNECT_DELAY_INITIAL_MS`: Initial backoff (default: 1000)
//! - `MIRROR_RECONNECT_DELAY_MAX_SECS`: Backoff cap (default: 30)
//! - `MIRROR_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use market_mirror::infrastructure::exchange::{
    kalshi::KalshiDecoder, polymarket::PolymarketDecoder, predictfun::PredictFunDecoder,
};
use market_mirror::infrastructure::telemetry;
use market_mirror::{
    BookService, Exchange, FeedClient, FeedClientConfig, FeedDecoder, FeedEvent, HeartbeatConfig,
    MirrorConfig, NoAuth, QuoteUpdate, ReconnectConfig, StaticHeaders, SubscriptionSet,
};
use tokio::signal;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting market mirror");

    let config = MirrorConfig::from_env()?;
    log_config(&config);

    let decoder: Arc<dyn FeedDecoder> = match config.exchange {
        Exchange::Kalshi => Arc::new(KalshiDecoder::new()),
        Exchange::Polymarket => Arc::new(PolymarketDecoder::new()),
        Exchange::PredictFun => Arc::new(PredictFunDecoder::new()),
    };

    let headers: Arc<dyn market_mirror::HeaderProvider> = match &config.credentials {
        Some(credentials) => Arc::new(StaticHeaders::new(vec![(
            "authorization".to_string(),
            format!("Bearer {}", credentials.api_key()),
        )])),
        None => Arc::new(NoAuth),
    };

    let subscriptions = Arc::new(SubscriptionSet::new());
    let (update_tx, update_rx) = mpsc::channel::<QuoteUpdate>(config.update_channel_capacity);
    let service = Arc::new(BookService::new(decoder, subscriptions, Some(update_tx)));

    // Seed the subscription set before the first connect; the frames go
    // out in on_connected.
    for instrument in &config.instruments {
        service.subscribe(instrument.clone());
    }

    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(64);
    let client_config = FeedClientConfig {
        url: config.stream_url(),
        reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
        heartbeat: HeartbeatConfig::from_websocket_settings(&config.websocket),
    };
    let client = Arc::new(FeedClient::new(
        client_config,
        Arc::clone(&service) as Arc<dyn market_mirror::StreamHandler>,
        headers,
        event_tx,
    ));

    tokio::spawn(handle_feed_events(event_rx));
    tokio::spawn(handle_quote_updates(update_rx));

    client.start()?;
    tracing::info!("Market mirror ready");

    await_shutdown().await;

    client.stop().await;
    tracing::info!("Market mirror stopped");
    Ok(())
}

/// Log connection lifecycle events.
async fn handle_feed_events(mut rx: mpsc::Receiver<FeedEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected => tracing::info!("Feed connected"),
            FeedEvent::Disconnected => tracing::warn!("Feed disconnected"),
            FeedEvent::Reconnecting { attempt } => {
                tracing::info!(attempt, "Feed reconnecting");
            }
        }
    }
}

/// Log top-of-book changes.
async fn handle_quote_updates(mut rx: mpsc::Receiver<QuoteUpdate>) {
    while let Some(update) = rx.recv().await {
        tracing::info!(
            instrument = %update.instrument,
            bid = ?update.quote.bid.map(|l| l.price),
            ask = ?update.quote.ask.map(|l| l.price),
            mid = ?update.quote.mid(),
            "Top of book changed"
        );
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &MirrorConfig) {
    tracing::info!(
        exchange = config.exchange.as_str(),
        environment = config.environment.as_str(),
        instruments = config.instruments.len(),
        authenticated = config.credentials.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(stream_url = %config.stream_url(), "WebSocket endpoint");
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
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
    }
}
