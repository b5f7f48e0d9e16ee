//! Spread Monitor - Cross-Venue BBO Spread Library
//!
//! This crate keeps the best bid/offer of several venues in a shared store,
//! computes pairwise cross-venue spreads on a fixed interval and notifies
//! configured sinks when a spread crosses the threshold, plus a periodic
//! status broadcast.

use std::sync::Arc;

pub mod alert;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod parser;
pub mod snapshot;
pub mod spread;
pub mod telemetry;

pub use alert::{AlertKey, AlertPolicy, BroadcastSummary, Notification, TickDecision};
pub use config::{Config, ConnectionMode, FeedTransport, SinkConfig, VenueConfig, VenueKind};
pub use dispatch::{DeliveryOutcome, DeliveryStatus, Dispatcher, Sink};
pub use error::{MonitorError, Result};
pub use feed::{FeedContext, FeedManager, RestPoller};
pub use metrics::Metrics;
pub use monitor::SpreadMonitor;
pub use parser::{ParsedMessage, QuoteUpdate};
pub use snapshot::{Bbo, Snapshot, SnapshotStore};
pub use spread::{InstrumentSpreads, SpreadEngine, SpreadOpportunity, VenuePair};

/// Application state shared with the health server
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub metrics: Metrics,
    pub config: Arc<Config>,
}
