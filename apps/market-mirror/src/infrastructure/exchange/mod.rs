//! Exchange Feed Decoders
//!
//! Per-exchange message-shape differences are isolated behind one
//! [`FeedDecoder`] per exchange, which turns raw frames into the tagged
//! [`FeedMessage`] variants the book layer consumes. The book layer
//! never sees exchange wire formats.
//!
//! Decoders also build the outbound control frames (subscribe,
//! unsubscribe, protocol-level ping) because their shape is just as
//! exchange-specific as the inbound one.

use rust_decimal::Decimal;

use crate::domain::book::{InstrumentId, PriceLevel, Side};

/// Kalshi orderbook_delta channel decoder.
pub mod kalshi;

/// Polymarket CLOB market channel decoder.
pub mod polymarket;

/// Predict.fun predictOrderbook topic decoder.
pub mod predictfun;

/// Complete replacement of one instrument's book state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSnapshot {
    /// Instrument the snapshot belongs to.
    pub instrument: InstrumentId,
    /// Full bid levels.
    pub bids: Vec<PriceLevel>,
    /// Full ask levels.
    pub asks: Vec<PriceLevel>,
    /// Protocol sequence number, where the exchange provides one.
    pub seq: Option<u64>,
}

/// Incremental signed quantity change to one `(side, price)` level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDelta {
    /// Instrument the delta belongs to.
    pub instrument: InstrumentId,
    /// Book side the level sits on.
    pub side: Side,
    /// Level price.
    pub price: Decimal,
    /// Signed quantity change.
    pub delta: Decimal,
    /// Protocol sequence number, where the exchange provides one.
    pub seq: Option<u64>,
}

/// Non-book control traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Liveness response (pong or equivalent). Bookkeeping only.
    Heartbeat,
    /// Subscription acknowledgement.
    Subscribed {
        /// Exchange-provided detail (channel, topic, sid).
        detail: Option<String>,
    },
    /// Exchange-reported error for this session.
    Error {
        /// Error text from the exchange.
        message: String,
    },
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Full book replacement for one instrument.
    Snapshot(BookSnapshot),
    /// Incremental level change for one instrument.
    Delta(BookDelta),
    /// Heartbeat / acknowledgement / error traffic.
    Control(ControlMessage),
    /// Syntactically valid frame of a type this decoder does not know.
    Unrecognized {
        /// The unrecognized discriminator, for logging.
        kind: String,
    },
}

/// Decode failures. One bad frame is logged and discarded by the
/// dispatch loop; it never ends the session.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Frame was not valid JSON or did not match the expected shape.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame parsed but a required field was missing.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// Frame parsed but a field held an unusable value.
    #[error("invalid value for `{field}`: {detail}")]
    InvalidValue {
        /// Offending field name.
        field: &'static str,
        /// What was wrong with it.
        detail: String,
    },
}

/// Exchange-specific wire codec.
///
/// `next_id` supplies the monotonically increasing request id that
/// outbound control frames carry; decoders call it once per frame that
/// needs one.
pub trait FeedDecoder: Send + Sync {
    /// Decode one raw text frame into zero or more feed messages.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed frames; the caller logs
    /// and discards them.
    fn decode(&self, raw: &str) -> Result<Vec<FeedMessage>, DecodeError>;

    /// Build the subscribe frames for a set of instruments.
    fn subscribe_frames(
        &self,
        instruments: &[InstrumentId],
        next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String>;

    /// Build the unsubscribe frames for a set of instruments.
    fn unsubscribe_frames(
        &self,
        instruments: &[InstrumentId],
        next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String>;

    /// Protocol-level ping frame, for exchanges whose liveness runs
    /// above the WebSocket layer. `None` means plain WebSocket pings
    /// suffice.
    fn ping_frame(&self, next_id: &mut dyn FnMut() -> u64) -> Option<String>;
}
