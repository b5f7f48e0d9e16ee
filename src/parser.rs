//! Parser module for venue BBO messages
//!
//! Turns Binance `bookTicker`, Bybit `orderbook.1` and OKX `bbo-tbt` pushes,
//! plus the matching REST responses, into a venue-neutral [`QuoteUpdate`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

use crate::config::VenueKind;
use crate::error::{MonitorError, Result};
use crate::snapshot::Bbo;

/// Top of book for one venue symbol, prior to instrument mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteUpdate {
    /// Venue-native symbol, e.g. `BTCUSDT` or `BTC-USDT`
    pub symbol: String,
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
}

impl QuoteUpdate {
    /// Stamp with the local receive time
    pub fn into_bbo(self, observed_at: DateTime<Utc>) -> Bbo {
        Bbo {
            bid: self.bid,
            bid_size: self.bid_size,
            ask: self.ask,
            ask_size: self.ask_size,
            observed_at,
        }
    }

    fn from_levels(symbol: &str, bids: &[PriceLevel], asks: &[PriceLevel]) -> Option<Self> {
        let bid = bids.first()?;
        let ask = asks.first()?;
        Some(Self {
            symbol: symbol.to_string(),
            bid: bid.price,
            bid_size: bid.quantity,
            ask: ask.price,
            ask_size: ask.quantity,
        })
    }
}

/// Price level (price, quantity pair)
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Binance `bookTicker` payload
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceBookTicker {
    /// Order book update ID
    #[serde(rename = "u")]
    pub update_id: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "b", deserialize_with = "deserialize_decimal")]
    pub bid: Decimal,

    #[serde(rename = "B", deserialize_with = "deserialize_decimal")]
    pub bid_qty: Decimal,

    #[serde(rename = "a", deserialize_with = "deserialize_decimal")]
    pub ask: Decimal,

    #[serde(rename = "A", deserialize_with = "deserialize_decimal")]
    pub ask_qty: Decimal,
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    pub stream: String,
    pub data: Value,
}

/// Bybit `orderbook.1` push
#[derive(Debug, Clone, Deserialize)]
pub struct BybitOrderbookMessage {
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: BybitOrderbook,
}

/// Bybit top-of-book body, shared by WebSocket and REST
#[derive(Debug, Clone, Deserialize)]
pub struct BybitOrderbook {
    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "b", deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(rename = "a", deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// OKX channel push
#[derive(Debug, Clone, Deserialize)]
pub struct OkxPush {
    pub arg: OkxArg,
    pub data: Vec<OkxBook>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkxArg {
    pub channel: String,
    #[serde(rename = "instId")]
    pub inst_id: String,
}

/// OKX book entry; levels are `[price, size, deprecated, order_count]`
#[derive(Debug, Clone, Deserialize)]
pub struct OkxBook {
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Quote(QuoteUpdate),
    /// Subscription acks, pongs and other session chatter
    Control(String),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message from the given venue
    pub fn parse(venue: VenueKind, raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed == "pong" {
            return Ok(ParsedMessage::Control(trimmed.to_string()));
        }

        let value: Value = serde_json::from_str(trimmed)?;
        match venue {
            VenueKind::Binance => Self::parse_binance(value),
            VenueKind::Bybit => Self::parse_bybit(value),
            VenueKind::Okx => Self::parse_okx(value),
        }
    }

    fn parse_binance(value: Value) -> Result<Self> {
        // Combined streams wrap the payload, raw streams do not
        let data = match serde_json::from_value::<StreamMessage>(value.clone()) {
            Ok(stream_msg) if stream_msg.stream.ends_with("@bookTicker") => stream_msg.data,
            Ok(stream_msg) => return Ok(ParsedMessage::Unknown(stream_msg.stream)),
            Err(_) => value,
        };

        if data.get("result").is_some() && data.get("id").is_some() {
            return Ok(ParsedMessage::Control(data.to_string()));
        }
        if let Some(msg) = venue_error(&data) {
            return Err(MonitorError::VenueRejected {
                venue: "binance".to_string(),
                message: msg,
            });
        }
        if data.get("u").is_none() || data.get("s").is_none() {
            return Ok(ParsedMessage::Unknown(data.to_string()));
        }

        let ticker: BinanceBookTicker = serde_json::from_value(data)?;
        Ok(ParsedMessage::Quote(QuoteUpdate {
            symbol: ticker.symbol,
            bid: ticker.bid,
            bid_size: ticker.bid_qty,
            ask: ticker.ask,
            ask_size: ticker.ask_qty,
        }))
    }

    fn parse_bybit(value: Value) -> Result<Self> {
        if value.get("op").is_some() {
            if value.get("success").and_then(Value::as_bool) == Some(false) {
                return Err(MonitorError::VenueRejected {
                    venue: "bybit".to_string(),
                    message: value
                        .get("ret_msg")
                        .and_then(Value::as_str)
                        .unwrap_or("subscription refused")
                        .to_string(),
                });
            }
            return Ok(ParsedMessage::Control(value.to_string()));
        }

        let is_orderbook = value
            .get("topic")
            .and_then(Value::as_str)
            .is_some_and(|topic| topic.starts_with("orderbook."));
        if !is_orderbook {
            return Ok(ParsedMessage::Unknown(value.to_string()));
        }

        let msg: BybitOrderbookMessage = serde_json::from_value(value)?;
        // A delta that leaves one side untouched carries no full quote
        Ok(
            match QuoteUpdate::from_levels(&msg.data.symbol, &msg.data.bids, &msg.data.asks) {
                Some(quote) => ParsedMessage::Quote(quote),
                None => ParsedMessage::Unknown(format!("{} {} one-sided", msg.topic, msg.kind)),
            },
        )
    }

    fn parse_okx(value: Value) -> Result<Self> {
        if let Some(event) = value.get("event").and_then(Value::as_str) {
            if event == "error" {
                return Err(MonitorError::VenueRejected {
                    venue: "okx".to_string(),
                    message: value
                        .get("msg")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                });
            }
            return Ok(ParsedMessage::Control(value.to_string()));
        }

        if value.get("arg").is_none() || value.get("data").is_none() {
            return Ok(ParsedMessage::Unknown(value.to_string()));
        }

        let push: OkxPush = serde_json::from_value(value)?;
        if push.arg.channel != "bbo-tbt" {
            return Ok(ParsedMessage::Unknown(push.arg.channel));
        }
        Ok(push
            .data
            .first()
            .and_then(|book| QuoteUpdate::from_levels(&push.arg.inst_id, &book.bids, &book.asks))
            .map(ParsedMessage::Quote)
            .unwrap_or_else(|| ParsedMessage::Unknown(format!("{} empty book", push.arg.inst_id))))
    }
}

/// Binance `/api/v3/ticker/bookTicker` response
#[derive(Debug, Clone, Deserialize)]
struct BinanceRestTicker {
    symbol: String,
    #[serde(rename = "bidPrice", deserialize_with = "deserialize_decimal")]
    bid_price: Decimal,
    #[serde(rename = "bidQty", deserialize_with = "deserialize_decimal")]
    bid_qty: Decimal,
    #[serde(rename = "askPrice", deserialize_with = "deserialize_decimal")]
    ask_price: Decimal,
    #[serde(rename = "askQty", deserialize_with = "deserialize_decimal")]
    ask_qty: Decimal,
}

/// Bybit v5 REST envelope
#[derive(Debug, Clone, Deserialize)]
struct BybitRestResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

/// OKX v5 REST envelope
#[derive(Debug, Clone, Deserialize)]
struct OkxRestResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<OkxBook>,
}

/// Parse a REST top-of-book response for `symbol`
pub fn parse_rest_quote(venue: VenueKind, symbol: &str, raw: &str) -> Result<QuoteUpdate> {
    let empty = || MonitorError::RestApiError(format!("Empty book for {symbol}"));

    match venue {
        VenueKind::Binance => {
            let value: Value = serde_json::from_str(raw)?;
            if let Some(msg) = venue_error(&value) {
                return Err(MonitorError::VenueRejected {
                    venue: "binance".to_string(),
                    message: msg,
                });
            }
            let ticker: BinanceRestTicker = serde_json::from_value(value)?;
            Ok(QuoteUpdate {
                symbol: ticker.symbol,
                bid: ticker.bid_price,
                bid_size: ticker.bid_qty,
                ask: ticker.ask_price,
                ask_size: ticker.ask_qty,
            })
        }
        VenueKind::Bybit => {
            let response: BybitRestResponse = serde_json::from_str(raw)?;
            if response.ret_code != 0 {
                return Err(MonitorError::VenueRejected {
                    venue: "bybit".to_string(),
                    message: format!("{} ({})", response.ret_msg, response.ret_code),
                });
            }
            let book: BybitOrderbook = serde_json::from_value(response.result)?;
            QuoteUpdate::from_levels(&book.symbol, &book.bids, &book.asks).ok_or_else(empty)
        }
        VenueKind::Okx => {
            let response: OkxRestResponse = serde_json::from_str(raw)?;
            if response.code != "0" {
                return Err(MonitorError::VenueRejected {
                    venue: "okx".to_string(),
                    message: format!("{} ({})", response.msg, response.code),
                });
            }
            response
                .data
                .first()
                .and_then(|book| QuoteUpdate::from_levels(symbol, &book.bids, &book.asks))
                .ok_or_else(empty)
        }
    }
}

/// Binance-style `{"code": <negative>, "msg": ...}` error body
fn venue_error(value: &Value) -> Option<String> {
    let code = value.get("code")?.as_i64()?;
    let msg = value.get("msg").and_then(Value::as_str).unwrap_or_default();
    Some(format!("{msg} ({code})"))
}

/// Custom deserializer for Decimal from string
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}

/// Custom deserializer for price levels; only the first two fields are used
fn deserialize_price_levels<'de, D>(deserializer: D) -> std::result::Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|level| {
            if level.len() < 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: Decimal::from_str(&level[0]).map_err(serde::de::Error::custom)?,
                quantity: Decimal::from_str(&level[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}
