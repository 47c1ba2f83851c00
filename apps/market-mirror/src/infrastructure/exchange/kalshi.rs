//! Kalshi Orderbook Decoder
//!
//! Kalshi streams the `orderbook_delta` channel as an envelope with a
//! `type` discriminator, an envelope-level `seq`, and a `msg` payload:
//!
//! - `orderbook_snapshot`: full `yes` / `no` level arrays of
//!   `[price_cents, contracts]` pairs.
//! - `orderbook_delta`: one `(side, price, delta)` change.
//!
//! Kalshi books are quoted as YES and NO bids in cents. This decoder
//! normalizes to a single YES-terms book: YES bids become bids at
//! `price / 100`, NO bids become asks at `(100 - price) / 100` (a
//! resting NO buy at p is a YES sell at 100 - p). The book layer never
//! sees the yes/no split.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::domain::book::{InstrumentId, PriceLevel, Side};

use super::{BookDelta, BookSnapshot, ControlMessage, DecodeError, FeedDecoder, FeedMessage};

/// Production WebSocket endpoint.
pub const WS_URL: &str = "wss://api.elections.kalshi.com/trade-api/ws/v2";

/// Demo environment WebSocket endpoint.
pub const WS_URL_DEMO: &str = "wss://demo-api.kalshi.co/trade-api/ws/v2";

/// Channel carrying snapshots and deltas.
const ORDERBOOK_CHANNEL: &str = "orderbook_delta";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    seq: Option<u64>,
    #[serde(default)]
    msg: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SnapshotMsg {
    market_ticker: String,
    #[serde(default)]
    yes: Vec<(i64, i64)>,
    #[serde(default)]
    no: Vec<(i64, i64)>,
}

#[derive(Debug, Deserialize)]
struct DeltaMsg {
    market_ticker: String,
    price: i64,
    delta: i64,
    side: String,
}

/// Decoder for the Kalshi `orderbook_delta` channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct KalshiDecoder;

impl KalshiDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decode_snapshot(msg: serde_json::Value, seq: Option<u64>) -> Result<FeedMessage, DecodeError> {
        let snapshot: SnapshotMsg = serde_json::from_value(msg)?;

        let bids = snapshot
            .yes
            .iter()
            .map(|&(price, qty)| Ok(PriceLevel::new(cents(price)?, Decimal::from(qty))))
            .collect::<Result<Vec<_>, DecodeError>>()?;
        let asks = snapshot
            .no
            .iter()
            .map(|&(price, qty)| Ok(PriceLevel::new(complement_cents(price)?, Decimal::from(qty))))
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok(FeedMessage::Snapshot(BookSnapshot {
            instrument: snapshot.market_ticker,
            bids,
            asks,
            seq,
        }))
    }

    fn decode_delta(msg: serde_json::Value, seq: Option<u64>) -> Result<FeedMessage, DecodeError> {
        let delta: DeltaMsg = serde_json::from_value(msg)?;

        let (side, price) = match delta.side.as_str() {
            "yes" => (Side::Bid, cents(delta.price)?),
            "no" => (Side::Ask, complement_cents(delta.price)?),
            other => {
                return Err(DecodeError::InvalidValue {
                    field: "side",
                    detail: format!("expected yes or no, got {other}"),
                });
            }
        };

        Ok(FeedMessage::Delta(BookDelta {
            instrument: delta.market_ticker,
            side,
            price,
            delta: Decimal::from(delta.delta),
            seq,
        }))
    }

    fn command_frame(cmd: &str, instruments: &[InstrumentId], id: u64) -> String {
        json!({
            "id": id,
            "cmd": cmd,
            "params": {
                "channels": [ORDERBOOK_CHANNEL],
                "market_tickers": instruments,
            },
        })
        .to_string()
    }
}

impl FeedDecoder for KalshiDecoder {
    fn decode(&self, raw: &str) -> Result<Vec<FeedMessage>, DecodeError> {
        let envelope: Envelope = serde_json::from_str(raw)?;

        let message = match envelope.msg_type.as_str() {
            "orderbook_snapshot" => Self::decode_snapshot(envelope.msg, envelope.seq)?,
            "orderbook_delta" => Self::decode_delta(envelope.msg, envelope.seq)?,
            "subscribed" | "unsubscribed" | "ok" => FeedMessage::Control(ControlMessage::Subscribed {
                detail: envelope.msg.get("channel").and_then(|v| v.as_str()).map(String::from),
            }),
            "error" => FeedMessage::Control(ControlMessage::Error {
                message: envelope
                    .msg
                    .get("msg")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unspecified error")
                    .to_string(),
            }),
            other => FeedMessage::Unrecognized {
                kind: other.to_string(),
            },
        };

        Ok(vec![message])
    }

    fn subscribe_frames(
        &self,
        instruments: &[InstrumentId],
        next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String> {
        if instruments.is_empty() {
            return Vec::new();
        }
        vec![Self::command_frame("subscribe", instruments, next_id())]
    }

    fn unsubscribe_frames(
        &self,
        instruments: &[InstrumentId],
        next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String> {
        if instruments.is_empty() {
            return Vec::new();
        }
        vec![Self::command_frame("unsubscribe", instruments, next_id())]
    }

    fn ping_frame(&self, _next_id: &mut dyn FnMut() -> u64) -> Option<String> {
        // Kalshi liveness runs on plain WebSocket ping/pong.
        None
    }
}

/// Price in cents as a decimal probability (45 -> 0.45).
fn cents(price: i64) -> Result<Decimal, DecodeError> {
    if (0..=100).contains(&price) {
        Ok(Decimal::new(price, 2))
    } else {
        Err(DecodeError::InvalidValue {
            field: "price",
            detail: format!("expected 0..=100 cents, got {price}"),
        })
    }
}

/// NO-side price in cents mapped to the YES-terms ask price.
fn complement_cents(price: i64) -> Result<Decimal, DecodeError> {
    if (0..=100).contains(&price) {
        Ok(Decimal::new(100 - price, 2))
    } else {
        Err(DecodeError::InvalidValue {
            field: "price",
            detail: format!("expected 0..=100 cents, got {price}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn decodes_snapshot_into_yes_terms_book() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{
            "type": "orderbook_snapshot",
            "seq": 4,
            "msg": {
                "market_ticker": "KXBTC-25DEC31",
                "yes": [[40, 100], [39, 50]],
                "no": [[55, 200]]
            }
        }"#;

        let messages = decoder.decode(raw).unwrap();
        assert_eq!(messages.len(), 1);

        let FeedMessage::Snapshot(snapshot) = &messages[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.instrument, "KXBTC-25DEC31");
        assert_eq!(snapshot.seq, Some(4));
        assert_eq!(snapshot.bids[0], PriceLevel::new(dec("0.40"), dec("100")));
        assert_eq!(snapshot.bids[1], PriceLevel::new(dec("0.39"), dec("50")));
        // NO bid at 55 cents is a YES ask at 45 cents.
        assert_eq!(snapshot.asks[0], PriceLevel::new(dec("0.45"), dec("200")));
    }

    #[test]
    fn decodes_yes_delta_as_bid() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{
            "type": "orderbook_delta",
            "seq": 9,
            "msg": {"market_ticker": "KXBTC-25DEC31", "price": 41, "delta": -5, "side": "yes"}
        }"#;

        let messages = decoder.decode(raw).unwrap();
        let FeedMessage::Delta(delta) = &messages[0] else {
            panic!("expected delta");
        };
        assert_eq!(delta.side, Side::Bid);
        assert_eq!(delta.price, dec("0.41"));
        assert_eq!(delta.delta, dec("-5"));
        assert_eq!(delta.seq, Some(9));
    }

    #[test]
    fn decodes_no_delta_as_complemented_ask() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{
            "type": "orderbook_delta",
            "msg": {"market_ticker": "KXBTC-25DEC31", "price": 60, "delta": 10, "side": "no"}
        }"#;

        let messages = decoder.decode(raw).unwrap();
        let FeedMessage::Delta(delta) = &messages[0] else {
            panic!("expected delta");
        };
        assert_eq!(delta.side, Side::Ask);
        assert_eq!(delta.price, dec("0.40"));
        assert_eq!(delta.delta, dec("10"));
        assert_eq!(delta.seq, None);
    }

    #[test]
    fn rejects_unknown_side() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{
            "type": "orderbook_delta",
            "msg": {"market_ticker": "T", "price": 60, "delta": 1, "side": "maybe"}
        }"#;

        assert!(decoder.decode(raw).is_err());
    }

    #[test]
    fn rejects_out_of_range_price() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{
            "type": "orderbook_delta",
            "msg": {"market_ticker": "T", "price": 250, "delta": 1, "side": "yes"}
        }"#;

        assert!(decoder.decode(raw).is_err());
    }

    #[test]
    fn subscribed_ack_is_control() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{"type": "subscribed", "msg": {"channel": "orderbook_delta", "sid": 1}}"#;

        let messages = decoder.decode(raw).unwrap();
        assert_eq!(
            messages[0],
            FeedMessage::Control(ControlMessage::Subscribed {
                detail: Some("orderbook_delta".to_string())
            })
        );
    }

    #[test]
    fn error_frame_is_control_error() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{"type": "error", "msg": {"code": 6, "msg": "unknown ticker"}}"#;

        let messages = decoder.decode(raw).unwrap();
        assert_eq!(
            messages[0],
            FeedMessage::Control(ControlMessage::Error {
                message: "unknown ticker".to_string()
            })
        );
    }

    #[test]
    fn unknown_type_is_unrecognized_not_error() {
        let decoder = KalshiDecoder::new();
        let raw = r#"{"type": "fill", "msg": {}}"#;

        let messages = decoder.decode(raw).unwrap();
        assert_eq!(
            messages[0],
            FeedMessage::Unrecognized {
                kind: "fill".to_string()
            }
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let decoder = KalshiDecoder::new();
        assert!(decoder.decode("not json").is_err());
    }

    #[test]
    fn subscribe_frame_carries_channel_tickers_and_id() {
        let decoder = KalshiDecoder::new();
        let mut id = 41u64;
        let mut next_id = || {
            id += 1;
            id
        };

        let frames =
            decoder.subscribe_frames(&["A".to_string(), "B".to_string()], &mut next_id);
        assert_eq!(frames.len(), 1);

        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["cmd"], "subscribe");
        assert_eq!(value["params"]["channels"][0], "orderbook_delta");
        assert_eq!(value["params"]["market_tickers"][0], "A");
        assert_eq!(value["params"]["market_tickers"][1], "B");
    }

    #[test]
    fn no_frames_for_empty_instrument_set() {
        let decoder = KalshiDecoder::new();
        let mut next_id = || 1u64;
        assert!(decoder.subscribe_frames(&[], &mut next_id).is_empty());
        assert!(decoder.unsubscribe_frames(&[], &mut next_id).is_empty());
    }

    #[test]
    fn no_protocol_ping() {
        let decoder = KalshiDecoder::new();
        let mut next_id = || 1u64;
        assert!(decoder.ping_frame(&mut next_id).is_none());
    }
}
