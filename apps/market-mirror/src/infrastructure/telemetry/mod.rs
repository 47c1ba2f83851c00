//! Tracing Setup
//!
//! Structured logging through `tracing` with an environment-driven
//! filter. `RUST_LOG` overrides the defaults.
//!
//! # Usage
//!
//! ```ignore
//! use market_mirror::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!("mirror starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Call once at startup. A second call panics inside
/// `tracing-subscriber`, so tests use their own harness instead.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "market_mirror=info"
                .parse()
                .expect("static directive 'market_mirror=info' is valid"),
        )
        .add_directive(
            "market-mirror=info"
                .parse()
                .expect("static directive 'market-mirror=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
        .add_directive(
            "tokio_tungstenite=warn"
                .parse()
                .expect("static directive 'tokio_tungstenite=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
