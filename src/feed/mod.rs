//! Feed adapters
//!
//! One task per venue keeps that venue's BBOs in the snapshot store, over a
//! WebSocket stream or by REST polling.

mod client;
mod manager;
mod poller;
mod venue;

pub use client::WebSocketClient;
pub use manager::FeedManager;
pub use poller::{http_client, RestPoller, REQUEST_TIMEOUT};

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, trace};

use crate::config::{normalize_instrument, FeedTransport, VenueConfig};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::parser::QuoteUpdate;
use crate::snapshot::SnapshotStore;

/// What a venue feed needs to turn venue quotes into store records
#[derive(Clone)]
pub struct FeedContext {
    pub venue: VenueConfig,
    /// venue symbol -> canonical instrument
    instruments: BTreeMap<String, String>,
    store: Arc<SnapshotStore>,
    metrics: Metrics,
}

impl FeedContext {
    /// Resolve the venue's subscriptions against the universe.
    ///
    /// A venue with no listed symbols follows the whole universe.
    pub fn new(
        venue: VenueConfig,
        universe: &[String],
        store: Arc<SnapshotStore>,
        metrics: Metrics,
    ) -> Result<Self> {
        let listed: Vec<String> = venue
            .symbols
            .iter()
            .map(|s| normalize_instrument(s))
            .collect::<Result<_>>()?;

        let instruments = universe
            .iter()
            .filter(|instrument| listed.is_empty() || listed.contains(instrument))
            .map(|instrument| (venue.kind.venue_symbol(instrument), instrument.clone()))
            .collect::<BTreeMap<_, _>>();

        for instrument in instruments.values() {
            store.register(&venue.name, instrument);
        }

        Ok(Self {
            venue,
            instruments,
            store,
            metrics,
        })
    }

    /// Venue symbols this feed follows, sorted
    pub fn venue_symbols(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    pub fn ws_endpoint(&self) -> &str {
        self.venue
            .ws_endpoint
            .as_deref()
            .unwrap_or_else(|| self.venue.kind.default_ws_endpoint())
    }

    pub fn rest_endpoint(&self) -> &str {
        self.venue
            .rest_endpoint
            .as_deref()
            .unwrap_or_else(|| self.venue.kind.default_rest_endpoint())
    }

    /// Write a quote into the store, stamped with the local receive time.
    ///
    /// Returns false for symbols this feed does not follow.
    pub fn apply(&self, quote: QuoteUpdate) -> bool {
        let Some(instrument) = self.instruments.get(&quote.symbol) else {
            trace!(venue = %self.venue.name, symbol = %quote.symbol, "Quote for unfollowed symbol");
            return false;
        };

        self.store
            .put(&self.venue.name, instrument, quote.into_bbo(Utc::now()));
        self.metrics
            .quote_updates
            .with_label_values(&[self.venue.name.as_str()])
            .inc();
        true
    }
}

/// Spawn one feed task per venue
pub fn spawn_feeds(
    venues: &[VenueConfig],
    universe: &[String],
    store: Arc<SnapshotStore>,
    metrics: Metrics,
    reconnect_delay_ms: u64,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(venues.len());
    let client = http_client(REQUEST_TIMEOUT)?;

    for venue in venues {
        let context = FeedContext::new(venue.clone(), universe, store.clone(), metrics.clone())?;

        info!(
            venue = %venue.name,
            kind = venue.kind.as_str(),
            mode = ?venue.mode,
            transport = ?venue.transport,
            symbols = context.instruments.len(),
            "Starting feed"
        );

        let shutdown = shutdown.clone();
        let handle = match venue.transport {
            FeedTransport::WebSocket => {
                let mut manager = FeedManager::new(context, reconnect_delay_ms);
                tokio::spawn(async move { manager.run(shutdown).await })
            }
            FeedTransport::Rest => {
                let poller = RestPoller::new(context, client.clone());
                tokio::spawn(async move { poller.run(shutdown).await })
            }
        };
        handles.push(handle);
    }

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionMode, VenueKind};
    use rust_decimal_macros::dec;

    fn venue(name: &str, kind: VenueKind, symbols: &[&str]) -> VenueConfig {
        VenueConfig {
            name: name.to_string(),
            kind,
            mode: ConnectionMode::Public,
            api_key: None,
            api_secret: None,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            transport: FeedTransport::WebSocket,
            poll_interval_ms: 1000,
            ws_endpoint: None,
            rest_endpoint: None,
        }
    }

    fn universe() -> Vec<String> {
        vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
    }

    #[test]
    fn test_context_follows_listed_symbols_in_universe() {
        let store = Arc::new(SnapshotStore::new());
        let context = FeedContext::new(
            venue("okx-main", VenueKind::Okx, &["BTC-USDT", "SOL-USDT"]),
            &universe(),
            store.clone(),
            Metrics::new().unwrap(),
        )
        .unwrap();

        assert_eq!(context.venue_symbols(), vec!["BTC-USDT"]);
        assert_eq!(store.venues().into_iter().collect::<Vec<_>>(), vec!["okx-main"]);
        assert_eq!(context.ws_endpoint(), "wss://ws.okx.com:8443/ws/v5/public");
    }

    #[test]
    fn test_context_without_symbols_follows_universe() {
        let context = FeedContext::new(
            venue("binance", VenueKind::Binance, &[]),
            &universe(),
            Arc::new(SnapshotStore::new()),
            Metrics::new().unwrap(),
        )
        .unwrap();
        assert_eq!(context.venue_symbols(), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_apply_writes_store_and_counts() {
        let store = Arc::new(SnapshotStore::new());
        let metrics = Metrics::new().unwrap();
        let context = FeedContext::new(
            venue("bybit", VenueKind::Bybit, &["BTC/USDT"]),
            &universe(),
            store.clone(),
            metrics.clone(),
        )
        .unwrap();

        let quote = QuoteUpdate {
            symbol: "BTCUSDT".to_string(),
            bid: dec!(100),
            bid_size: dec!(1),
            ask: dec!(101),
            ask_size: dec!(2),
        };
        assert!(context.apply(quote.clone()));
        assert!(!context.apply(QuoteUpdate {
            symbol: "DOGEUSDT".to_string(),
            ..quote
        }));

        let all = store.get_all("BTC/USDT");
        assert_eq!(all["bybit"].ask, dec!(101));
        assert_eq!(
            metrics.quote_updates.with_label_values(&["bybit"]).get(),
            1
        );
    }
}
