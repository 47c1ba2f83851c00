//! Polymarket Market Channel Decoder
//!
//! Polymarket's market channel is a top-of-book push feed keyed by
//! outcome token (`asset_id`). `book` events carry full bid/ask arrays
//! and `price_change` events carry batched best-price moves, but the
//! feed is consumed as a best-bid/ask mirror: every event decodes to a
//! single-level snapshot. There are no sequence numbers.
//!
//! Price moves do not restate sizes, so the decoder remembers the last
//! size seen per token and side and pairs it with the new best price.
//! Before the first `book` event a side's size is unknown; the book
//! layer drops zero-quantity levels, so such quotes stay empty until
//! the initial book arrives.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::domain::book::{InstrumentId, PriceLevel};

use super::{BookSnapshot, DecodeError, FeedDecoder, FeedMessage};

/// Production WebSocket endpoint (CLOB market channel).
pub const WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

#[derive(Debug, Deserialize)]
struct BookEvent {
    asset_id: Option<String>,
    #[serde(default)]
    bids: Vec<WireLevel>,
    #[serde(default)]
    asks: Vec<WireLevel>,
}

#[derive(Debug, Deserialize)]
struct WireLevel {
    price: Decimal,
    size: Decimal,
}

#[derive(Debug, Deserialize)]
struct PriceChangeEvent {
    #[serde(default)]
    price_changes: Vec<PriceChange>,
}

#[derive(Debug, Deserialize)]
struct PriceChange {
    asset_id: Option<String>,
    side: Option<String>,
    price: Option<Decimal>,
    size: Option<Decimal>,
    best_bid: Option<Decimal>,
    best_ask: Option<Decimal>,
}

/// Last-known best levels for one outcome token.
#[derive(Debug, Default, Clone, Copy)]
struct BestQuote {
    bid: Option<PriceLevel>,
    ask: Option<PriceLevel>,
}

/// Decoder for the Polymarket CLOB market channel.
#[derive(Debug, Default)]
pub struct PolymarketDecoder {
    quotes: Mutex<HashMap<InstrumentId, BestQuote>>,
}

impl PolymarketDecoder {
    /// Create a new decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_event(&self, event: serde_json::Value) -> Result<Vec<FeedMessage>, DecodeError> {
        let kind = event
            .get("event_type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        if kind.as_deref() == Some("book") {
            let book: BookEvent = serde_json::from_value(event)?;
            return Ok(self.apply_book(book).into_iter().collect());
        }

        if event.get("price_changes").is_some() {
            let batch: PriceChangeEvent = serde_json::from_value(event)?;
            return Ok(batch
                .price_changes
                .into_iter()
                .filter_map(|change| self.apply_change(change))
                .collect());
        }

        // Bare best-price objects arrive without an event type.
        let change: PriceChange = serde_json::from_value(event)?;
        Ok(match self.apply_change(change) {
            Some(message) => vec![message],
            None => vec![FeedMessage::Unrecognized {
                kind: kind.unwrap_or_else(|| "untyped".to_string()),
            }],
        })
    }

    fn apply_book(&self, book: BookEvent) -> Option<FeedMessage> {
        let asset_id = book.asset_id?;

        let bid = book
            .bids
            .into_iter()
            .max_by_key(|level| level.price)
            .map(|level| PriceLevel::new(level.price, level.size));
        let ask = book
            .asks
            .into_iter()
            .min_by_key(|level| level.price)
            .map(|level| PriceLevel::new(level.price, level.size));

        let mut quotes = self.quotes.lock();
        let entry = quotes.entry(asset_id.clone()).or_default();
        entry.bid = bid;
        entry.ask = ask;

        Some(Self::snapshot(asset_id, *entry))
    }

    fn apply_change(&self, change: PriceChange) -> Option<FeedMessage> {
        let asset_id = change.asset_id.clone()?;
        if change.best_bid.is_none() && change.best_ask.is_none() {
            return None;
        }

        let mut quotes = self.quotes.lock();
        let entry = quotes.entry(asset_id.clone()).or_default();

        if let Some(price) = change.best_bid {
            entry.bid = Some(PriceLevel::new(
                price,
                Self::level_size(&change, "buy", price, entry.bid),
            ));
        }
        if let Some(price) = change.best_ask {
            entry.ask = Some(PriceLevel::new(
                price,
                Self::level_size(&change, "sell", price, entry.ask),
            ));
        }

        Some(Self::snapshot(asset_id, *entry))
    }

    /// The change's own size applies only when it restates the new best
    /// level; otherwise the last-known size for the side carries over.
    fn level_size(
        change: &PriceChange,
        side: &str,
        best: Decimal,
        previous: Option<PriceLevel>,
    ) -> Decimal {
        match (change.side.as_deref(), change.price, change.size) {
            (Some(s), Some(price), Some(size)) if s.eq_ignore_ascii_case(side) && price == best => {
                size
            }
            _ => previous.map_or(Decimal::ZERO, |level| level.quantity),
        }
    }

    fn snapshot(asset_id: InstrumentId, quote: BestQuote) -> FeedMessage {
        FeedMessage::Snapshot(BookSnapshot {
            instrument: asset_id,
            bids: quote.bid.into_iter().collect(),
            asks: quote.ask.into_iter().collect(),
            seq: None,
        })
    }
}

impl FeedDecoder for PolymarketDecoder {
    fn decode(&self, raw: &str) -> Result<Vec<FeedMessage>, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        // The initial books after subscribing arrive as one array frame.
        match value {
            serde_json::Value::Array(events) => {
                let mut messages = Vec::new();
                for event in events {
                    messages.extend(self.decode_event(event)?);
                }
                Ok(messages)
            }
            event => self.decode_event(event),
        }
    }

    fn subscribe_frames(
        &self,
        instruments: &[InstrumentId],
        _next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String> {
        if instruments.is_empty() {
            return Vec::new();
        }

        vec![json!({"assets_ids": instruments, "type": "market"}).to_string()]
    }

    fn unsubscribe_frames(
        &self,
        _instruments: &[InstrumentId],
        _next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String> {
        // The market channel has no unsubscribe message; narrowing the
        // set takes effect on the next (re)connect.
        Vec::new()
    }

    fn ping_frame(&self, _next_id: &mut dyn FnMut() -> u64) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn book_event_reduces_to_best_levels() {
        let decoder = PolymarketDecoder::new();
        let raw = r#"{
            "event_type": "book",
            "asset_id": "0xtoken",
            "bids": [
                {"price": "0.38", "size": "50"},
                {"price": "0.40", "size": "100"}
            ],
            "asks": [
                {"price": "0.47", "size": "20"},
                {"price": "0.45", "size": "70"}
            ]
        }"#;

        let messages = decoder.decode(raw).unwrap();
        assert_eq!(messages.len(), 1);

        let FeedMessage::Snapshot(snapshot) = &messages[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.instrument, "0xtoken");
        assert_eq!(snapshot.bids, vec![PriceLevel::new(dec("0.40"), dec("100"))]);
        assert_eq!(snapshot.asks, vec![PriceLevel::new(dec("0.45"), dec("70"))]);
        assert_eq!(snapshot.seq, None);
    }

    #[test]
    fn price_change_moves_best_and_keeps_last_size() {
        let decoder = PolymarketDecoder::new();
        decoder
            .decode(
                r#"{
                    "event_type": "book",
                    "asset_id": "0xtoken",
                    "bids": [{"price": "0.40", "size": "100"}],
                    "asks": [{"price": "0.45", "size": "70"}]
                }"#,
            )
            .unwrap();

        let messages = decoder
            .decode(
                r#"{
                    "event_type": "price_change",
                    "price_changes": [
                        {"asset_id": "0xtoken", "best_bid": "0.41", "best_ask": "0.45"}
                    ]
                }"#,
            )
            .unwrap();

        let FeedMessage::Snapshot(snapshot) = &messages[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.bids, vec![PriceLevel::new(dec("0.41"), dec("100"))]);
        assert_eq!(snapshot.asks, vec![PriceLevel::new(dec("0.45"), dec("70"))]);
    }

    #[test]
    fn price_change_restating_the_best_level_updates_its_size() {
        let decoder = PolymarketDecoder::new();
        decoder
            .decode(
                r#"{
                    "event_type": "book",
                    "asset_id": "0xtoken",
                    "bids": [{"price": "0.40", "size": "100"}],
                    "asks": [{"price": "0.45", "size": "70"}]
                }"#,
            )
            .unwrap();

        let messages = decoder
            .decode(
                r#"{
                    "event_type": "price_change",
                    "price_changes": [
                        {
                            "asset_id": "0xtoken",
                            "side": "BUY",
                            "price": "0.42",
                            "size": "33",
                            "best_bid": "0.42",
                            "best_ask": "0.45"
                        }
                    ]
                }"#,
            )
            .unwrap();

        let FeedMessage::Snapshot(snapshot) = &messages[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.bids, vec![PriceLevel::new(dec("0.42"), dec("33"))]);
    }

    #[test]
    fn price_change_before_any_book_has_unknown_size() {
        let decoder = PolymarketDecoder::new();
        let messages = decoder
            .decode(r#"{"price_changes": [{"asset_id": "0xfresh", "best_bid": "0.30"}]}"#)
            .unwrap();

        let FeedMessage::Snapshot(snapshot) = &messages[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.bids, vec![PriceLevel::new(dec("0.30"), dec("0"))]);
        assert!(snapshot.asks.is_empty());
    }

    #[test]
    fn array_frame_decodes_every_event() {
        let decoder = PolymarketDecoder::new();
        let raw = r#"[
            {"event_type": "book", "asset_id": "0xaaa",
             "bids": [{"price": "0.40", "size": "10"}], "asks": []},
            {"event_type": "book", "asset_id": "0xbbb",
             "bids": [], "asks": [{"price": "0.61", "size": "3"}]}
        ]"#;

        let messages = decoder.decode(raw).unwrap();
        assert_eq!(messages.len(), 2);
        let FeedMessage::Snapshot(first) = &messages[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(first.instrument, "0xaaa");
        let FeedMessage::Snapshot(second) = &messages[1] else {
            panic!("expected snapshot");
        };
        assert_eq!(second.instrument, "0xbbb");
    }

    #[test]
    fn other_event_types_are_unrecognized() {
        let decoder = PolymarketDecoder::new();
        let messages = decoder
            .decode(r#"{"event_type": "last_trade_price", "asset_id": "0xtoken", "price": "0.5"}"#)
            .unwrap();
        assert_eq!(
            messages[0],
            FeedMessage::Unrecognized {
                kind: "last_trade_price".to_string()
            }
        );
    }

    #[test]
    fn subscribe_frame_carries_all_tokens() {
        let decoder = PolymarketDecoder::new();
        let mut next_id = || 1u64;

        let frames =
            decoder.subscribe_frames(&["0xaaa".to_string(), "0xbbb".to_string()], &mut next_id);
        assert_eq!(frames.len(), 1);

        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["type"], "market");
        assert_eq!(value["assets_ids"][0], "0xaaa");
        assert_eq!(value["assets_ids"][1], "0xbbb");
    }

    #[test]
    fn no_subscribe_frame_for_empty_set() {
        let decoder = PolymarketDecoder::new();
        let mut next_id = || 1u64;
        assert!(decoder.subscribe_frames(&[], &mut next_id).is_empty());
    }

    #[test]
    fn no_unsubscribe_or_protocol_ping() {
        let decoder = PolymarketDecoder::new();
        let mut next_id = || 1u64;
        assert!(
            decoder
                .unsubscribe_frames(&["0xaaa".to_string()], &mut next_id)
                .is_empty()
        );
        assert!(decoder.ping_frame(&mut next_id).is_none());
    }
}
