//! Snapshot module
//!
//! Latest top-of-book per (venue, instrument), written by feed adapters and
//! read by the spread engine.

mod store;

pub use store::SnapshotStore;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Best bid/offer as reported by a feed adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbo {
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
    /// Local receive time
    pub observed_at: DateTime<Utc>,
}

/// Most recently observed top-of-book for one venue/instrument pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub venue: String,
    pub instrument: String,
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(venue: &str, instrument: &str, bbo: Bbo) -> Self {
        Self {
            venue: venue.to_string(),
            instrument: instrument.to_string(),
            bid: bbo.bid,
            bid_size: bbo.bid_size,
            ask: bbo.ask,
            ask_size: bbo.ask_size,
            observed_at: bbo.observed_at,
        }
    }

    /// A snapshot with a zero or negative price is treated as absent
    pub fn is_usable(&self) -> bool {
        self.bid > Decimal::ZERO && self.ask > Decimal::ZERO
    }

    /// True when the snapshot is older than `max_age` at `now`.
    ///
    /// A snapshot stamped in the future counts as fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (now - self.observed_at).to_std() {
            Ok(age) => age > max_age,
            Err(_) => false,
        }
    }

    /// This venue's own bid/ask spread in percent of the bid
    pub fn own_spread_pct(&self) -> Option<Decimal> {
        if self.bid <= Decimal::ZERO {
            return None;
        }
        self.ask
            .checked_sub(self.bid)?
            .checked_div(self.bid)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}
