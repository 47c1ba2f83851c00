//! Order-Book State Types
//!
//! Pure domain types for the client-side mirror of one exchange's book:
//! price levels, per-side level maps, and the per-instrument book that
//! snapshots and deltas are applied to. No I/O, no locking - callers
//! own the concurrency discipline.
//!
//! # Invariants
//!
//! - Quantities are never stored at or below zero; a delta that drives a
//!   level to zero or negative removes the level.
//! - A snapshot replaces an instrument's state wholesale.
//! - The last-applied sequence is monotone: a delta carrying a sequence
//!   at or below the last applied one is reported stale and discarded.
//! - `last_update` advances only when a message is applied, so a caller
//!   can detect staleness across a reconnect gap.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Instrument identifier (market ticker or token id).
pub type InstrumentId = String;

/// Which side of the book a level or delta belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Resting buy orders. Best price is the maximum.
    Bid,
    /// Resting sell orders. Best price is the minimum.
    Ask,
}

impl Side {
    /// Side name for logs and wire frames.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bid => "bid",
            Self::Ask => "ask",
        }
    }
}

/// A single `(price, quantity)` resting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting quantity. Always positive once stored.
    pub quantity: Decimal,
}

impl PriceLevel {
    /// Create a new level.
    #[must_use]
    pub const fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// One side of an instrument's book.
///
/// Levels are keyed by price in a `BTreeMap`, so the best price is the
/// last key for bids and the first key for asks. Zero and negative
/// quantities are never stored.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl BookSide {
    /// Create an empty side.
    #[must_use]
    pub const fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Which side this is.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Replace all levels wholesale. Levels with non-positive quantity
    /// are skipped rather than stored.
    pub fn replace(&mut self, levels: impl IntoIterator<Item = PriceLevel>) {
        self.levels.clear();
        for level in levels {
            if level.quantity > Decimal::ZERO {
                self.levels.insert(level.price, level.quantity);
            }
        }
    }

    /// Apply a signed quantity delta at a price, treating an absent
    /// level as quantity zero. A result at or below zero removes the
    /// level.
    ///
    /// Returns `true` if the stored state changed.
    pub fn apply_delta(&mut self, price: Decimal, delta: Decimal) -> bool {
        let current = self.levels.get(&price).copied().unwrap_or(Decimal::ZERO);
        let updated = current + delta;

        if updated > Decimal::ZERO {
            self.levels.insert(price, updated);
            current != updated
        } else if current > Decimal::ZERO {
            self.levels.remove(&price);
            true
        } else {
            // Delta into an absent level that stays absent.
            false
        }
    }

    /// Best level: highest price for bids, lowest for asks. `None` when
    /// the side is empty - never a zero or sentinel price.
    #[must_use]
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.last_key_value(),
            Side::Ask => self.levels.first_key_value(),
        };
        entry.map(|(price, quantity)| PriceLevel::new(*price, *quantity))
    }

    /// Exact-level quantity lookup. Zero if absent.
    #[must_use]
    pub fn quantity_at(&self, price: Decimal) -> Decimal {
        self.levels.get(&price).copied().unwrap_or(Decimal::ZERO)
    }

    /// Number of resting levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the side has no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// All levels, best price first.
    #[must_use]
    pub fn levels(&self) -> Vec<PriceLevel> {
        let iter = self
            .levels
            .iter()
            .map(|(price, quantity)| PriceLevel::new(*price, *quantity));
        match self.side {
            Side::Bid => iter.rev().collect(),
            Side::Ask => iter.collect(),
        }
    }
}

/// Outcome of applying a delta to an [`InstrumentBook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Delta was applied. `changed` is false for no-op deltas (for
    /// example a negative delta into an absent level).
    Applied {
        /// Whether any stored level changed.
        changed: bool,
    },
    /// Delta carried a sequence at or below the last applied one and
    /// was discarded.
    Stale,
}

/// Point-in-time derived view of one instrument: best bid, best ask,
/// and the timestamp of the last applied message.
///
/// Always computed from the live book on read, never stored as
/// independent mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedQuote {
    /// Best bid, absent when the bid side is empty.
    pub bid: Option<PriceLevel>,
    /// Best ask, absent when the ask side is empty.
    pub ask: Option<PriceLevel>,
    /// When the instrument last applied a message. Does not advance
    /// across a silent reconnect gap, which is how staleness shows.
    pub last_update: DateTime<Utc>,
}

impl DerivedQuote {
    /// Midpoint of best bid and best ask. `None` unless both sides are
    /// present.
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Best-ask minus best-bid spread. `None` unless both sides are
    /// present.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// Full book state for one instrument.
///
/// Created on first snapshot (or first buffered-then-replayed delta),
/// replaced wholesale on every fresh snapshot.
#[derive(Debug, Clone)]
pub struct InstrumentBook {
    bids: BookSide,
    asks: BookSide,
    last_seq: Option<u64>,
    last_update: DateTime<Utc>,
}

impl InstrumentBook {
    /// Create an empty book stamped at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            last_seq: None,
            last_update: now,
        }
    }

    /// Replace the whole book with snapshot levels.
    ///
    /// This is the only way an instrument returns to a fully-trusted
    /// state after a gap. Applying the same snapshot twice is
    /// idempotent.
    pub fn apply_snapshot(
        &mut self,
        bids: impl IntoIterator<Item = PriceLevel>,
        asks: impl IntoIterator<Item = PriceLevel>,
        seq: Option<u64>,
        now: DateTime<Utc>,
    ) {
        self.bids.replace(bids);
        self.asks.replace(asks);
        self.last_seq = seq;
        self.last_update = now;
    }

    /// Apply one signed delta.
    ///
    /// A delta whose sequence is at or below the last applied one is
    /// discarded as [`DeltaOutcome::Stale`]; the book is untouched and
    /// `last_update` does not advance.
    pub fn apply_delta(
        &mut self,
        side: Side,
        price: Decimal,
        delta: Decimal,
        seq: Option<u64>,
        now: DateTime<Utc>,
    ) -> DeltaOutcome {
        if let (Some(incoming), Some(applied)) = (seq, self.last_seq)
            && incoming <= applied
        {
            return DeltaOutcome::Stale;
        }

        let changed = match side {
            Side::Bid => self.bids.apply_delta(price, delta),
            Side::Ask => self.asks.apply_delta(price, delta),
        };

        if seq.is_some() {
            self.last_seq = seq;
        }
        self.last_update = now;

        DeltaOutcome::Applied { changed }
    }

    /// The bid side.
    #[must_use]
    pub const fn bids(&self) -> &BookSide {
        &self.bids
    }

    /// The ask side.
    #[must_use]
    pub const fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Sequence of the last applied message, where the protocol
    /// provides one.
    #[must_use]
    pub const fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Timestamp of the last applied message.
    #[must_use]
    pub const fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Exact-level quantity lookup on one side. Zero if absent.
    #[must_use]
    pub fn quantity_at(&self, side: Side, price: Decimal) -> Decimal {
        match side {
            Side::Bid => self.bids.quantity_at(price),
            Side::Ask => self.asks.quantity_at(price),
        }
    }

    /// Current derived quote, computed from live state.
    #[must_use]
    pub fn derived_quote(&self) -> DerivedQuote {
        DerivedQuote {
            bid: self.bids.best(),
            ask: self.asks.best(),
            last_update: self.last_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn level(price: &str, qty: &str) -> PriceLevel {
        PriceLevel::new(dec(price), dec(qty))
    }

    #[test]
    fn empty_side_best_is_none() {
        let side = BookSide::new(Side::Bid);
        assert!(side.best().is_none());
        assert!(side.is_empty());
    }

    #[test]
    fn bid_best_is_highest_price() {
        let mut side = BookSide::new(Side::Bid);
        side.replace(vec![level("10", "5"), level("12", "1"), level("11", "3")]);

        assert_eq!(side.best(), Some(level("12", "1")));
    }

    #[test]
    fn ask_best_is_lowest_price() {
        let mut side = BookSide::new(Side::Ask);
        side.replace(vec![level("15", "2"), level("13", "4"), level("14", "1")]);

        assert_eq!(side.best(), Some(level("13", "4")));
    }

    #[test]
    fn replace_skips_non_positive_quantities() {
        let mut side = BookSide::new(Side::Bid);
        side.replace(vec![level("10", "5"), level("11", "0"), level("12", "-3")]);

        assert_eq!(side.len(), 1);
        assert_eq!(side.best(), Some(level("10", "5")));
    }

    #[test]
    fn delta_adds_to_existing_level() {
        let mut side = BookSide::new(Side::Bid);
        side.replace(vec![level("10", "5")]);

        assert!(side.apply_delta(dec("10"), dec("3")));
        assert_eq!(side.quantity_at(dec("10")), dec("8"));
    }

    #[test]
    fn delta_creates_absent_level() {
        let mut side = BookSide::new(Side::Ask);

        assert!(side.apply_delta(dec("11"), dec("4")));
        assert_eq!(side.quantity_at(dec("11")), dec("4"));
    }

    #[test]
    fn delta_to_zero_removes_level() {
        let mut side = BookSide::new(Side::Bid);
        side.replace(vec![level("10", "5")]);

        assert!(side.apply_delta(dec("10"), dec("-5")));
        assert!(side.is_empty());
        assert_eq!(side.quantity_at(dec("10")), Decimal::ZERO);
    }

    #[test]
    fn delta_below_zero_removes_level_never_negative() {
        let mut side = BookSide::new(Side::Bid);
        side.replace(vec![level("10", "5")]);

        assert!(side.apply_delta(dec("10"), dec("-9")));
        assert!(side.best().is_none());
        assert_eq!(side.quantity_at(dec("10")), Decimal::ZERO);
    }

    #[test]
    fn negative_delta_into_absent_level_is_noop() {
        let mut side = BookSide::new(Side::Bid);

        assert!(!side.apply_delta(dec("10"), dec("-2")));
        assert!(side.is_empty());
    }

    #[test]
    fn levels_are_best_first() {
        let mut bids = BookSide::new(Side::Bid);
        bids.replace(vec![level("10", "1"), level("12", "2"), level("11", "3")]);
        let prices: Vec<_> = bids.levels().iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec("12"), dec("11"), dec("10")]);

        let mut asks = BookSide::new(Side::Ask);
        asks.replace(vec![level("15", "1"), level("13", "2"), level("14", "3")]);
        let prices: Vec<_> = asks.levels().iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec("13"), dec("14"), dec("15")]);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let now = Utc::now();
        let mut book = InstrumentBook::new(now);

        book.apply_snapshot(vec![level("10", "5")], vec![level("11", "3")], Some(7), now);
        let first = book.derived_quote();

        book.apply_snapshot(vec![level("10", "5")], vec![level("11", "3")], Some(7), now);
        let second = book.derived_quote();

        assert_eq!(first, second);
        assert_eq!(first.bid, Some(level("10", "5")));
        assert_eq!(first.ask, Some(level("11", "3")));
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let now = Utc::now();
        let mut book = InstrumentBook::new(now);

        book.apply_snapshot(
            vec![level("10", "5"), level("9", "2")],
            vec![level("11", "3")],
            None,
            now,
        );
        book.apply_snapshot(vec![level("8", "1")], vec![], None, now);

        assert_eq!(book.derived_quote().bid, Some(level("8", "1")));
        assert!(book.derived_quote().ask.is_none());
        assert_eq!(book.quantity_at(Side::Bid, dec("10")), Decimal::ZERO);
    }

    #[test]
    fn delta_convergence_removes_best_and_falls_back() {
        let now = Utc::now();
        let mut book = InstrumentBook::new(now);
        book.apply_snapshot(
            vec![level("10", "5"), level("9", "4")],
            vec![level("11", "3")],
            None,
            now,
        );

        let outcome = book.apply_delta(Side::Bid, dec("10"), dec("-5"), None, now);
        assert_eq!(outcome, DeltaOutcome::Applied { changed: true });
        assert_eq!(book.derived_quote().bid, Some(level("9", "4")));

        let outcome = book.apply_delta(Side::Bid, dec("9"), dec("-4"), None, now);
        assert_eq!(outcome, DeltaOutcome::Applied { changed: true });
        assert!(book.derived_quote().bid.is_none());
    }

    #[test]
    fn stale_sequence_is_discarded() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(1);
        let mut book = InstrumentBook::new(now);
        book.apply_snapshot(vec![level("10", "5")], vec![], Some(10), now);

        let outcome = book.apply_delta(Side::Bid, dec("10"), dec("-5"), Some(10), later);
        assert_eq!(outcome, DeltaOutcome::Stale);
        assert_eq!(book.quantity_at(Side::Bid, dec("10")), dec("5"));
        // Stale deltas do not advance the staleness timestamp.
        assert_eq!(book.last_update(), now);

        let outcome = book.apply_delta(Side::Bid, dec("10"), dec("1"), Some(11), later);
        assert_eq!(outcome, DeltaOutcome::Applied { changed: true });
        assert_eq!(book.last_seq(), Some(11));
        assert_eq!(book.last_update(), later);
    }

    #[test]
    fn mid_and_spread_require_both_sides() {
        let now = Utc::now();
        let mut book = InstrumentBook::new(now);
        book.apply_snapshot(vec![level("10", "5")], vec![], None, now);

        let quote = book.derived_quote();
        assert!(quote.mid().is_none());
        assert!(quote.spread().is_none());

        book.apply_snapshot(vec![level("10", "5")], vec![level("11", "3")], None, now);
        let quote = book.derived_quote();
        assert_eq!(quote.mid(), Some(dec("10.5")));
        assert_eq!(quote.spread(), Some(dec("1")));
    }

    #[test]
    fn last_update_tracks_applied_messages() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let mut book = InstrumentBook::new(t0);
        book.apply_snapshot(vec![level("10", "5")], vec![], None, t0);
        assert_eq!(book.derived_quote().last_update, t0);

        book.apply_delta(Side::Bid, dec("10"), dec("1"), None, t1);
        assert_eq!(book.derived_quote().last_update, t1);
    }
}
