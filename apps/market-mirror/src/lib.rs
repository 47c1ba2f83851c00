#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Mirror - Resilient Order-Book Client
//!
//! Maintains a live local mirror of exchange order books over a
//! self-healing WebSocket connection. One transport owns the socket;
//! one book service owns the state; readers query the mirror
//! synchronously at any time.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Order-book state with no I/O
//!   - `book`: Price levels, per-instrument books, derived quotes
//!   - `subscription`: Instrument subscription tracking
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport/book contracts (`StreamHandler`, `OutboundSink`)
//!   - `services`: Book reconstruction from snapshots and deltas
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ws`: Reconnecting WebSocket client with heartbeat monitoring
//!   - `exchange`: Kalshi, Polymarket, and Predict.fun wire decoders
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Exchange WS ──► FeedClient ──► FeedDecoder ──► BookService ──► readers
//!                     ▲                              │
//!                     └──── subscribe frames ◄───────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order-book types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::book::{
    BookSide, DeltaOutcome, DerivedQuote, InstrumentBook, InstrumentId, PriceLevel, Side,
};
pub use domain::subscription::SubscriptionSet;

// Application layer
pub use application::ports::{HeaderProvider, NoAuth, OutboundSink, StaticHeaders, StreamHandler};
pub use application::services::{BookService, QuoteUpdate};

// Exchange decoders
pub use infrastructure::exchange::{
    BookDelta, BookSnapshot, ControlMessage, DecodeError, FeedDecoder, FeedMessage,
};

// Transport
pub use infrastructure::ws::{FeedClient, FeedClientConfig, FeedClientError, FeedEvent};
pub use infrastructure::ws::heartbeat::HeartbeatConfig;
pub use infrastructure::ws::reconnect::ReconnectConfig;

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, Credentials, Environment, Exchange, MirrorConfig, WebSocketSettings,
};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
