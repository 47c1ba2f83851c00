//! Predict.fun Orderbook Decoder
//!
//! Predict.fun pushes whole per-outcome books on a
//! `predictOrderbook/<market_id>` topic. Each push carries every
//! outcome's full bid and ask arrays, so every frame decodes to one
//! absolute snapshot per outcome token - there is no delta stream and
//! no sequence number.
//!
//! Liveness is protocol-level: the client sends `{"id": n, "type":
//! "ping"}` and the server answers with `pong`.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::domain::book::{InstrumentId, PriceLevel};

use super::{BookSnapshot, ControlMessage, DecodeError, FeedDecoder, FeedMessage};

/// Production WebSocket endpoint.
pub const WS_URL: &str = "wss://ws.predict.fun";

/// Testnet WebSocket endpoint.
pub const WS_URL_TESTNET: &str = "wss://ws.testnet.predict.fun";

const ORDERBOOK_TOPIC_PREFIX: &str = "predictOrderbook/";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    topic: Option<String>,
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OrderbookPayload {
    #[serde(default)]
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    #[serde(rename = "onChainId")]
    on_chain_id: Option<String>,
    #[serde(default)]
    bids: Vec<WireLevel>,
    #[serde(default)]
    asks: Vec<WireLevel>,
}

#[derive(Debug, Deserialize)]
struct WireLevel {
    price: Decimal,
    quantity: Decimal,
}

/// Decoder for the Predict.fun `predictOrderbook` topics.
#[derive(Debug, Default, Clone, Copy)]
pub struct PredictFunDecoder;

impl PredictFunDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decode_orderbook(data: serde_json::Value) -> Result<Vec<FeedMessage>, DecodeError> {
        let payload: OrderbookPayload = serde_json::from_value(data)?;

        let mut messages = Vec::with_capacity(payload.outcomes.len());
        for outcome in payload.outcomes {
            // Outcomes without an on-chain token id cannot be keyed.
            let Some(token_id) = outcome.on_chain_id else {
                continue;
            };

            messages.push(FeedMessage::Snapshot(BookSnapshot {
                instrument: token_id,
                bids: outcome
                    .bids
                    .into_iter()
                    .map(|l| PriceLevel::new(l.price, l.quantity))
                    .collect(),
                asks: outcome
                    .asks
                    .into_iter()
                    .map(|l| PriceLevel::new(l.price, l.quantity))
                    .collect(),
                seq: None,
            }));
        }

        Ok(messages)
    }

    fn topic_frame(kind: &str, market_id: &str, id: u64) -> String {
        json!({
            "id": id,
            "type": kind,
            "topic": format!("{ORDERBOOK_TOPIC_PREFIX}{market_id}"),
        })
        .to_string()
    }
}

impl FeedDecoder for PredictFunDecoder {
    fn decode(&self, raw: &str) -> Result<Vec<FeedMessage>, DecodeError> {
        let envelope: Envelope = serde_json::from_str(raw)?;

        match envelope.msg_type.as_deref() {
            Some("pong") => return Ok(vec![FeedMessage::Control(ControlMessage::Heartbeat)]),
            Some("subscribed") => {
                return Ok(vec![FeedMessage::Control(ControlMessage::Subscribed {
                    detail: envelope.topic,
                })]);
            }
            Some("error") => {
                return Ok(vec![FeedMessage::Control(ControlMessage::Error {
                    message: envelope
                        .message
                        .unwrap_or_else(|| "unspecified error".to_string()),
                })]);
            }
            _ => {}
        }

        if let Some(topic) = &envelope.topic
            && topic.starts_with(ORDERBOOK_TOPIC_PREFIX)
        {
            return Self::decode_orderbook(envelope.data);
        }

        Ok(vec![FeedMessage::Unrecognized {
            kind: envelope
                .msg_type
                .or(envelope.topic)
                .unwrap_or_else(|| "untyped".to_string()),
        }])
    }

    fn subscribe_frames(
        &self,
        instruments: &[InstrumentId],
        next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String> {
        instruments
            .iter()
            .map(|market_id| Self::topic_frame("subscribe", market_id, next_id()))
            .collect()
    }

    fn unsubscribe_frames(
        &self,
        instruments: &[InstrumentId],
        next_id: &mut dyn FnMut() -> u64,
    ) -> Vec<String> {
        instruments
            .iter()
            .map(|market_id| Self::topic_frame("unsubscribe", market_id, next_id()))
            .collect()
    }

    fn ping_frame(&self, next_id: &mut dyn FnMut() -> u64) -> Option<String> {
        Some(json!({"id": next_id(), "type": "ping"}).to_string())
    }
}
