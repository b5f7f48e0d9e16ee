//! Spread module
//!
//! Pairwise cross-venue spread computation over fresh snapshots.

mod engine;

pub use engine::SpreadEngine;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// One direction of a cross-venue comparison: buy on one venue's ask, sell on
/// another venue's bid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadOpportunity {
    pub instrument: String,
    pub buy_venue: String,
    pub sell_venue: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// (sell - buy) / buy * 100, may be negative
    pub spread_pct: Decimal,
    pub tradable_volume: Decimal,
}

impl SpreadOpportunity {
    /// Direction-independent venue pair
    pub fn venue_pair(&self) -> VenuePair {
        VenuePair::new(&self.buy_venue, &self.sell_venue)
    }
}

/// Unordered venue pair, stored in lexicographic order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VenuePair {
    low: String,
    high: String,
}

impl VenuePair {
    pub fn new(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: low.to_string(),
            high: high.to_string(),
        }
    }

    pub fn venues(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

/// Everything one tick learned about an instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSpreads {
    pub instrument: String,
    /// Fresh snapshots that took part, ordered by venue name
    pub venues: Vec<Snapshot>,
    /// Sorted best first
    pub opportunities: Vec<SpreadOpportunity>,
}

impl InstrumentSpreads {
    pub fn best(&self) -> Option<&SpreadOpportunity> {
        self.opportunities.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_pair_is_unordered() {
        assert_eq!(VenuePair::new("okx", "binance"), VenuePair::new("binance", "okx"));
        assert_eq!(VenuePair::new("okx", "binance").venues(), ("binance", "okx"));
    }
}
