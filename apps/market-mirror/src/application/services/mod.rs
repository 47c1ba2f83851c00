//! Book Service
//!
//! The Book Reconstruction Layer: consumes the transport's message
//! stream, applies snapshots and deltas to per-instrument books, and
//! answers point-in-time queries from concurrent readers.
//!
//! # Concurrency
//!
//! All mutation runs on the transport's dispatch task through
//! `on_message`, so there is a single writer. Readers share the
//! instrument map behind a `parking_lot::RwLock` and always observe a
//! consistent (never torn) book state; they receive copies, never
//! references into live state.
//!
//! # Delta-before-snapshot policy
//!
//! A delta for an instrument that has no book yet is buffered (bounded
//! per instrument). When the first snapshot arrives, buffered deltas
//! sequenced after the snapshot are replayed in arrival order and the
//! rest are discarded; without sequence numbers the snapshot supersedes
//! the whole buffer. A delta is never applied to a non-existent book as
//! if it defined an absolute level.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::application::ports::{OutboundSink, StreamHandler};
use crate::domain::book::{
    DeltaOutcome, DerivedQuote, InstrumentBook, InstrumentId, PriceLevel, Side,
};
use crate::domain::subscription::SubscriptionSet;
use crate::infrastructure::exchange::{
    BookDelta, BookSnapshot, ControlMessage, FeedDecoder, FeedMessage,
};

/// Cap on buffered deltas per instrument awaiting a first snapshot.
const MAX_BUFFERED_DELTAS: usize = 256;

/// Notification emitted after a mutation changed an instrument's
/// derived best bid/ask. No-op deltas do not notify.
#[derive(Debug, Clone)]
pub struct QuoteUpdate {
    /// Instrument whose top of book changed.
    pub instrument: InstrumentId,
    /// The derived quote after the mutation.
    pub quote: DerivedQuote,
}

/// Exchange-agnostic order-book mirror.
///
/// Implements [`StreamHandler`] for the transport side and exposes the
/// synchronous read API (`quote`, `mid`, `spread`, `quantity_at`) plus
/// runtime `subscribe` / `unsubscribe` to the caller side. Safe to
/// share across tasks behind an `Arc`.
pub struct BookService {
    decoder: Arc<dyn FeedDecoder>,
    subscriptions: Arc<SubscriptionSet>,
    books: RwLock<HashMap<InstrumentId, InstrumentBook>>,
    pending: Mutex<HashMap<InstrumentId, VecDeque<BookDelta>>>,
    outbound: RwLock<Option<OutboundSink>>,
    update_tx: Option<mpsc::Sender<QuoteUpdate>>,
}

impl BookService {
    /// Create a new service.
    ///
    /// `update_tx`, when provided, receives a [`QuoteUpdate`] after
    /// every mutation that changes an instrument's derived quote.
    #[must_use]
    pub fn new(
        decoder: Arc<dyn FeedDecoder>,
        subscriptions: Arc<SubscriptionSet>,
        update_tx: Option<mpsc::Sender<QuoteUpdate>>,
    ) -> Self {
        Self {
            decoder,
            subscriptions,
            books: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            outbound: RwLock::new(None),
            update_tx,
        }
    }

    // -------------------------------------------------------------------------
    // Caller-facing API
    // -------------------------------------------------------------------------

    /// Subscribe to an instrument.
    ///
    /// The set change always sticks; the subscribe frame is best-effort
    /// and is reasserted on the next (re)connect if no connection is
    /// active right now.
    pub fn subscribe(&self, instrument: impl Into<InstrumentId>) {
        let instrument = instrument.into();
        if !self.subscriptions.add(instrument.clone()) {
            return;
        }

        tracing::info!(instrument = %instrument, "Subscribed");
        self.send_control(|decoder, next_id| {
            decoder.subscribe_frames(std::slice::from_ref(&instrument), next_id)
        });
    }

    /// Unsubscribe from an instrument and drop its book state.
    pub fn unsubscribe(&self, instrument: &str) {
        if !self.subscriptions.remove(instrument) {
            return;
        }

        self.books.write().remove(instrument);
        self.pending.lock().remove(instrument);

        tracing::info!(instrument = %instrument, "Unsubscribed");
        self.send_control(|decoder, next_id| {
            decoder.unsubscribe_frames(&[instrument.to_string()], next_id)
        });
    }

    /// Current subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<InstrumentId> {
        self.subscriptions.snapshot()
    }

    /// Point-in-time derived quote for an instrument, with the
    /// last-update timestamp alongside. `None` until any message has
    /// been applied for the instrument.
    #[must_use]
    pub fn quote(&self, instrument: &str) -> Option<DerivedQuote> {
        self.books
            .read()
            .get(instrument)
            .map(InstrumentBook::derived_quote)
    }

    /// Midpoint of best bid/ask. `None` unless both sides are present.
    #[must_use]
    pub fn mid(&self, instrument: &str) -> Option<Decimal> {
        self.quote(instrument).and_then(|q| q.mid())
    }

    /// Best-ask minus best-bid spread. `None` unless both sides are
    /// present.
    #[must_use]
    pub fn spread(&self, instrument: &str) -> Option<Decimal> {
        self.quote(instrument).and_then(|q| q.spread())
    }

    /// Exact-level quantity lookup. Zero if the level (or the whole
    /// instrument) is absent.
    #[must_use]
    pub fn quantity_at(&self, instrument: &str, side: Side, price: Decimal) -> Decimal {
        self.books
            .read()
            .get(instrument)
            .map_or(Decimal::ZERO, |book| book.quantity_at(side, price))
    }

    /// Copy of one side's levels, best price first. Empty if the
    /// instrument is unknown.
    #[must_use]
    pub fn levels(&self, instrument: &str, side: Side) -> Vec<PriceLevel> {
        self.books.read().get(instrument).map_or_else(Vec::new, |book| match side {
            Side::Bid => book.bids().levels(),
            Side::Ask => book.asks().levels(),
        })
    }

    // -------------------------------------------------------------------------
    // Message dispatch
    // -------------------------------------------------------------------------

    fn apply_snapshot(&self, snapshot: BookSnapshot) {
        let now = Utc::now();
        let buffered = self
            .pending
            .lock()
            .remove(&snapshot.instrument)
            .unwrap_or_default();

        let quote = {
            let mut books = self.books.write();
            let book = books
                .entry(snapshot.instrument.clone())
                .or_insert_with(|| InstrumentBook::new(now));

            let before = top_of_book(book);
            book.apply_snapshot(snapshot.bids, snapshot.asks, snapshot.seq, now);

            // Replay buffered deltas sequenced after the snapshot; the
            // snapshot supersedes everything else.
            if let Some(snapshot_seq) = snapshot.seq {
                for delta in buffered {
                    if delta.seq.is_some_and(|seq| seq > snapshot_seq) {
                        book.apply_delta(delta.side, delta.price, delta.delta, delta.seq, now);
                    }
                }
            }

            (top_of_book(book) != before).then(|| book.derived_quote())
        };

        if let Some(quote) = quote {
            self.notify(&snapshot.instrument, quote);
        }
    }

    fn apply_delta(&self, delta: BookDelta) {
        let now = Utc::now();

        let quote = {
            let mut books = self.books.write();
            let Some(book) = books.get_mut(&delta.instrument) else {
                drop(books);
                self.buffer_delta(delta);
                return;
            };

            let before = top_of_book(book);
            match book.apply_delta(delta.side, delta.price, delta.delta, delta.seq, now) {
                DeltaOutcome::Stale => {
                    tracing::debug!(
                        instrument = %delta.instrument,
                        seq = ?delta.seq,
                        last_seq = ?book.last_seq(),
                        "Discarding out-of-order delta"
                    );
                    None
                }
                DeltaOutcome::Applied { .. } => {
                    (top_of_book(book) != before).then(|| book.derived_quote())
                }
            }
        };

        if let Some(quote) = quote {
            self.notify(&delta.instrument, quote);
        }
    }

    fn buffer_delta(&self, delta: BookDelta) {
        let mut pending = self.pending.lock();
        let queue = pending.entry(delta.instrument.clone()).or_default();

        if queue.len() >= MAX_BUFFERED_DELTAS {
            queue.pop_front();
        }

        tracing::debug!(
            instrument = %delta.instrument,
            buffered = queue.len() + 1,
            "Buffering delta that arrived before any snapshot"
        );
        queue.push_back(delta);
    }

    fn handle_control(&self, control: ControlMessage) {
        match control {
            ControlMessage::Heartbeat => {
                tracing::trace!("Heartbeat acknowledged");
            }
            ControlMessage::Subscribed { detail } => {
                tracing::debug!(detail = ?detail, "Subscription confirmed");
            }
            ControlMessage::Error { message } => {
                // Session-level errors are logged; the session continues.
                tracing::warn!(error = %message, "Exchange reported an error");
            }
        }
    }

    fn notify(&self, instrument: &str, quote: DerivedQuote) {
        let Some(tx) = &self.update_tx else {
            return;
        };

        let update = QuoteUpdate {
            instrument: instrument.to_string(),
            quote,
        };
        if let Err(e) = tx.try_send(update) {
            tracing::debug!(error = %e, "Dropping quote update, consumer is behind");
        }
    }

    fn send_control(
        &self,
        build: impl FnOnce(&dyn FeedDecoder, &mut dyn FnMut() -> u64) -> Vec<String>,
    ) {
        let outbound = self.outbound.read().clone();
        let Some(sink) = outbound else {
            // No active connection; the set is reasserted on reconnect.
            return;
        };

        let mut next_id = || self.subscriptions.next_request_id();
        for frame in build(self.decoder.as_ref(), &mut next_id) {
            sink.send(frame);
        }
    }
}

#[async_trait]
impl StreamHandler for BookService {
    async fn on_connected(&self, outbound: OutboundSink) {
        *self.outbound.write() = Some(outbound.clone());

        let instruments = self.subscriptions.snapshot();
        tracing::info!(
            instruments = instruments.len(),
            "Connection established, reasserting subscriptions"
        );

        let mut next_id = || self.subscriptions.next_request_id();
        for frame in self.decoder.subscribe_frames(&instruments, &mut next_id) {
            outbound.send(frame);
        }
    }

    async fn on_message(&self, raw: &str) {
        let messages = match self.decoder.decode(raw) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, frame = %truncate(raw, 120), "Discarding undecodable frame");
                return;
            }
        };

        for message in messages {
            match message {
                FeedMessage::Snapshot(snapshot) => self.apply_snapshot(snapshot),
                FeedMessage::Delta(delta) => self.apply_delta(delta),
                FeedMessage::Control(control) => self.handle_control(control),
                FeedMessage::Unrecognized { kind } => {
                    tracing::trace!(kind = %kind, "Ignoring unrecognized message type");
                }
            }
        }
    }

    fn ping_frame(&self) -> Option<String> {
        let mut next_id = || self.subscriptions.next_request_id();
        self.decoder.ping_frame(&mut next_id)
    }
}

/// Best bid/ask pair, the state the change notification keys on.
fn top_of_book(book: &InstrumentBook) -> (Option<PriceLevel>, Option<PriceLevel>) {
    (book.bids().best(), book.asks().best())
}

fn truncate(s: &str, max: usize) -> &str {
    let end = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    &s[..end]
}
