//! Request and response message types for Binance depth and trade data

use crate::{DecodeError, PriceLevel, StreamMethod, TradeSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Types
// ============================================================================

/// Combined-stream control message
///
/// ```json
/// {"method": "SUBSCRIBE", "params": ["btcusdt@depth"], "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// SUBSCRIBE or UNSUBSCRIBE
    pub method: StreamMethod,
    /// Stream names
    pub params: Vec<String>,
    /// Request ID (echoed in the acknowledgement)
    pub id: u64,
}

impl StreamRequest {
    /// Create a subscribe request
    pub fn subscribe(streams: Vec<String>, id: u64) -> Self {
        Self {
            method: StreamMethod::Subscribe,
            params: streams,
            id,
        }
    }

    /// Create an unsubscribe request
    pub fn unsubscribe(streams: Vec<String>, id: u64) -> Self {
        Self {
            method: StreamMethod::Unsubscribe,
            params: streams,
            id,
        }
    }
}

// ============================================================================
// Depth Payloads
// ============================================================================

/// REST depth snapshot (`GET /api/v3/depth`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Sequence number the snapshot is consistent with
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    /// Bid levels, best first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first
    pub asks: Vec<PriceLevel>,
}

/// Incremental depth update from the `<symbol>@depth` stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEvent {
    /// Event type (always `depthUpdate`)
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Event time
    #[serde(
        rename = "E",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_time: Option<DateTime<Utc>>,
    /// Symbol the event belongs to
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// First update ID in this event
    #[serde(rename = "U")]
    pub first_update_id: u64,
    /// Final update ID in this event
    #[serde(rename = "u")]
    pub final_update_id: u64,
    /// Bid changes, in arrival order
    #[serde(rename = "b")]
    pub bid_changes: Vec<PriceLevel>,
    /// Ask changes, in arrival order
    #[serde(rename = "a")]
    pub ask_changes: Vec<PriceLevel>,
}

impl DiffEvent {
    /// Create a diff with no event metadata
    pub fn new(
        first_update_id: u64,
        final_update_id: u64,
        bid_changes: Vec<PriceLevel>,
        ask_changes: Vec<PriceLevel>,
    ) -> Self {
        Self {
            event_type: None,
            event_time: None,
            symbol: None,
            first_update_id,
            final_update_id,
            bid_changes,
            ask_changes,
        }
    }

    /// Check the update ID range is ordered
    pub fn is_well_formed(&self) -> bool {
        self.first_update_id <= self.final_update_id
    }

    /// Whether the range `[U, u]` contains `update_id`
    pub fn covers(&self, update_id: u64) -> bool {
        self.first_update_id <= update_id && update_id <= self.final_update_id
    }

    /// Total number of level changes in the event
    pub fn change_count(&self) -> usize {
        self.bid_changes.len() + self.ask_changes.len()
    }
}

// ============================================================================
// Trade Payloads
// ============================================================================

/// Aggregate trade, from `GET /api/v3/aggTrades` or the `<symbol>@aggTrade`
/// stream
///
/// The REST form carries no `e`/`E`/`s` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggTrade {
    /// Event type (always `aggTrade`)
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Event time
    #[serde(
        rename = "E",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_time: Option<DateTime<Utc>>,
    /// Symbol the trade belongs to
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Aggregate trade ID, increasing per symbol
    #[serde(rename = "a")]
    pub agg_id: u64,
    /// Price
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Quantity
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// First trade ID folded into this aggregate
    #[serde(rename = "f")]
    pub first_trade_id: u64,
    /// Last trade ID folded into this aggregate
    #[serde(rename = "l")]
    pub last_trade_id: u64,
    /// Trade time
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub trade_time: DateTime<Utc>,
    /// Buyer was the maker
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl AggTrade {
    /// Taker side
    pub fn side(&self) -> TradeSide {
        TradeSide::from_buyer_maker(self.is_buyer_maker)
    }

    /// Positive price and quantity, ordered trade ID range
    pub fn is_well_formed(&self) -> bool {
        self.price > Decimal::ZERO
            && self.quantity > Decimal::ZERO
            && self.first_trade_id <= self.last_trade_id
    }
}

// ============================================================================
// Stream Messages
// ============================================================================

/// Combined-stream wrapper: `{"stream": "...", "data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    /// Stream name, e.g. `btcusdt@depth`
    pub stream: String,
    /// Stream payload
    pub data: serde_json::Value,
}

/// Acknowledgement of a control request: `{"result": null, "id": 1}`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamAck {
    /// Result (null on success)
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Request ID being acknowledged
    pub id: Option<u64>,
}

/// Error reply to a control request
#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorReply {
    /// Error details
    pub error: StreamErrorBody,
    /// Request ID, if any
    pub id: Option<u64>,
}

/// Body of a [`StreamErrorReply`]
#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorBody {
    /// Binance error code
    pub code: i64,
    /// Human-readable message
    pub msg: String,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// Depth diff, with the stream name when it came through a combined stream
    Depth {
        stream: Option<String>,
        event: DiffEvent,
    },
    /// Aggregate trade, with the stream name when it came through a combined
    /// stream
    Trade {
        stream: Option<String>,
        trade: AggTrade,
    },
    /// Control request acknowledged
    Ack(StreamAck),
    /// Control request rejected
    Error(StreamErrorReply),
    /// Anything else
    Unknown(serde_json::Value),
}

impl StreamMessage {
    /// Parse a raw WebSocket text frame
    pub fn parse(json: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| DecodeError::invalid_json(e, json))?;

        if value.get("stream").is_some() && value.get("data").is_some() {
            let envelope: StreamEnvelope =
                serde_json::from_value(value).map_err(|e| DecodeError::invalid_json(e, json))?;

            if envelope.stream.contains("@depth") {
                let event = Self::decode_diff(envelope.data, json)?;
                return Ok(Self::Depth {
                    stream: Some(envelope.stream),
                    event,
                });
            }

            if envelope.stream.ends_with("@aggTrade") {
                let trade = Self::decode_trade(envelope.data, json)?;
                return Ok(Self::Trade {
                    stream: Some(envelope.stream),
                    trade,
                });
            }

            return Err(DecodeError::UnexpectedStream {
                stream: envelope.stream,
            });
        }

        // Raw (non-combined) stream payload
        match value.get("e").and_then(|v| v.as_str()) {
            Some("depthUpdate") => {
                let event = Self::decode_diff(value, json)?;
                return Ok(Self::Depth {
                    stream: None,
                    event,
                });
            }
            Some("aggTrade") => {
                let trade = Self::decode_trade(value, json)?;
                return Ok(Self::Trade {
                    stream: None,
                    trade,
                });
            }
            _ => {}
        }

        if value.get("error").is_some() {
            let reply: StreamErrorReply =
                serde_json::from_value(value).map_err(|e| DecodeError::invalid_json(e, json))?;
            return Ok(Self::Error(reply));
        }

        if value.get("id").is_some() && value.get("result").is_some() {
            let ack: StreamAck =
                serde_json::from_value(value).map_err(|e| DecodeError::invalid_json(e, json))?;
            return Ok(Self::Ack(ack));
        }

        Ok(Self::Unknown(value))
    }

    fn decode_diff(data: serde_json::Value, raw: &str) -> Result<DiffEvent, DecodeError> {
        let event: DiffEvent =
            serde_json::from_value(data).map_err(|e| DecodeError::invalid_json(e, raw))?;

        if !event.is_well_formed() {
            return Err(DecodeError::UnexpectedMessage(format!(
                "diff range U={} > u={}",
                event.first_update_id, event.final_update_id
            )));
        }

        Ok(event)
    }

    fn decode_trade(data: serde_json::Value, raw: &str) -> Result<AggTrade, DecodeError> {
        let trade: AggTrade =
            serde_json::from_value(data).map_err(|e| DecodeError::invalid_json(e, raw))?;

        if !trade.is_well_formed() {
            return Err(DecodeError::UnexpectedMessage(format!(
                "aggregate trade {} has price {} quantity {} trades {}..={}",
                trade.agg_id, trade.price, trade.quantity, trade.first_trade_id, trade.last_trade_id
            )));
        }

        Ok(trade)
    }
}
