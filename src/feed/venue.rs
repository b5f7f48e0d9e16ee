//! Per-venue endpoints, symbol mapping and subscription payloads

use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::config::VenueKind;

/// Bybit accepts at most this many topics per subscribe request
const BYBIT_MAX_ARGS: usize = 10;

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::Binance => "binance",
            VenueKind::Bybit => "bybit",
            VenueKind::Okx => "okx",
        }
    }

    /// Public market data WebSocket base
    pub fn default_ws_endpoint(&self) -> &'static str {
        match self {
            VenueKind::Binance => "wss://stream.binance.com:9443",
            VenueKind::Bybit => "wss://stream.bybit.com/v5/public/spot",
            VenueKind::Okx => "wss://ws.okx.com:8443/ws/v5/public",
        }
    }

    /// Public REST base
    pub fn default_rest_endpoint(&self) -> &'static str {
        match self {
            VenueKind::Binance => "https://api.binance.com",
            VenueKind::Bybit => "https://api.bybit.com",
            VenueKind::Okx => "https://www.okx.com",
        }
    }

    /// Map a canonical `BASE/QUOTE` instrument to the venue's symbol
    pub fn venue_symbol(&self, instrument: &str) -> String {
        let (base, quote) = instrument.split_once('/').unwrap_or((instrument, ""));
        match self {
            VenueKind::Binance | VenueKind::Bybit => format!("{base}{quote}"),
            VenueKind::Okx => format!("{base}-{quote}"),
        }
    }

    /// Connection URL; Binance encodes its subscriptions in the URL
    pub fn stream_url(&self, endpoint: &str, symbols: &[String]) -> String {
        let endpoint = endpoint.trim_end_matches('/');
        match self {
            VenueKind::Binance => {
                let streams: Vec<String> = symbols
                    .iter()
                    .map(|s| format!("{}@bookTicker", s.to_lowercase()))
                    .collect();
                format!("{}/stream?streams={}", endpoint, streams.join("/"))
            }
            VenueKind::Bybit | VenueKind::Okx => endpoint.to_string(),
        }
    }

    /// Messages to send right after connecting
    pub fn subscribe_messages(&self, symbols: &[String]) -> Vec<String> {
        match self {
            VenueKind::Binance => Vec::new(),
            VenueKind::Bybit => symbols
                .chunks(BYBIT_MAX_ARGS)
                .map(|chunk| {
                    let args: Vec<String> =
                        chunk.iter().map(|s| format!("orderbook.1.{s}")).collect();
                    json!({ "op": "subscribe", "args": args }).to_string()
                })
                .collect(),
            VenueKind::Okx => {
                let args: Vec<_> = symbols
                    .iter()
                    .map(|s| json!({ "channel": "bbo-tbt", "instId": s }))
                    .collect();
                vec![json!({ "op": "subscribe", "args": args }).to_string()]
            }
        }
    }

    /// Keepalive frame; Bybit and OKX expect application-level pings
    pub fn ping_message(&self) -> Message {
        match self {
            VenueKind::Binance => Message::Ping(Vec::new()),
            VenueKind::Bybit => Message::Text(json!({ "op": "ping" }).to_string()),
            VenueKind::Okx => Message::Text("ping".to_string()),
        }
    }

    /// REST top-of-book URL for one symbol
    pub fn rest_url(&self, endpoint: &str, symbol: &str) -> String {
        let endpoint = endpoint.trim_end_matches('/');
        match self {
            VenueKind::Binance => format!("{endpoint}/api/v3/ticker/bookTicker?symbol={symbol}"),
            VenueKind::Bybit => {
                format!("{endpoint}/v5/market/orderbook?category=spot&symbol={symbol}&limit=1")
            }
            VenueKind::Okx => format!("{endpoint}/api/v5/market/books?instId={symbol}&sz=1"),
        }
    }
}
