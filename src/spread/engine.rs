//! Cross-venue spread engine
//!
//! For every unordered venue pair both directions are evaluated:
//! buy `a.ask` / sell `b.bid` and buy `b.ask` / sell `a.bid`.
//! Signs are kept; thresholds belong to the alert policy.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::{InstrumentSpreads, SpreadOpportunity};
use crate::snapshot::{Snapshot, SnapshotStore};

/// Computes spread opportunities from the snapshot store
#[derive(Debug, Clone)]
pub struct SpreadEngine {
    store: Arc<SnapshotStore>,
    max_age: Duration,
}

impl SpreadEngine {
    /// Create an engine that ignores snapshots older than `max_age`
    pub fn new(store: Arc<SnapshotStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// Every direction for every fresh venue pair of `instrument`, best first
    pub fn evaluate(&self, instrument: &str, now: DateTime<Utc>) -> Vec<SpreadOpportunity> {
        let fresh = self.store.fresh(instrument, now, self.max_age);
        Self::compare(instrument, &fresh)
    }

    /// Opportunities plus the snapshots they were computed from
    pub fn report(&self, instrument: &str, now: DateTime<Utc>) -> InstrumentSpreads {
        let fresh = self.store.fresh(instrument, now, self.max_age);
        let opportunities = Self::compare(instrument, &fresh);

        trace!(
            instrument = %instrument,
            venues = fresh.len(),
            opportunities = opportunities.len(),
            "Evaluated instrument"
        );

        InstrumentSpreads {
            instrument: instrument.to_string(),
            venues: fresh.into_values().collect(),
            opportunities,
        }
    }

    /// Report for each instrument of the universe, in universe order
    pub fn evaluate_all(&self, universe: &[String], now: DateTime<Utc>) -> Vec<InstrumentSpreads> {
        universe
            .iter()
            .map(|instrument| self.report(instrument, now))
            .collect()
    }

    /// Pairwise comparison over a venue-keyed snapshot set.
    ///
    /// The map is ordered by venue name, so each unordered pair is visited
    /// exactly once.
    pub fn compare(
        instrument: &str,
        snapshots: &BTreeMap<String, Snapshot>,
    ) -> Vec<SpreadOpportunity> {
        if snapshots.len() < 2 {
            return Vec::new();
        }

        let venues: Vec<&Snapshot> = snapshots.values().collect();
        let mut opportunities = Vec::with_capacity(venues.len() * (venues.len() - 1));

        for (i, a) in venues.iter().enumerate() {
            for b in &venues[i + 1..] {
                opportunities.extend(Self::direction(instrument, a, b));
                opportunities.extend(Self::direction(instrument, b, a));
            }
        }

        opportunities.sort_by(|x, y| {
            y.spread_pct
                .cmp(&x.spread_pct)
                .then_with(|| x.buy_venue.cmp(&y.buy_venue))
                .then_with(|| x.sell_venue.cmp(&y.sell_venue))
        });
        opportunities
    }

    /// Buy at `buy.ask`, sell at `sell.bid`.
    ///
    /// A direction whose arithmetic overflows `Decimal` is dropped.
    fn direction(instrument: &str, buy: &Snapshot, sell: &Snapshot) -> Option<SpreadOpportunity> {
        let buy_price = buy.ask;
        if buy_price <= Decimal::ZERO {
            return None;
        }
        let sell_price = sell.bid;
        let Some(spread_pct) = spread_percent(buy_price, sell_price) else {
            trace!(
                instrument = %instrument,
                buy = %buy.venue,
                sell = %sell.venue,
                "Spread overflowed, direction skipped"
            );
            return None;
        };

        Some(SpreadOpportunity {
            instrument: instrument.to_string(),
            buy_venue: buy.venue.clone(),
            sell_venue: sell.venue.clone(),
            buy_price,
            sell_price,
            spread_pct,
            tradable_volume: buy.ask_size.min(sell.bid_size),
        })
    }
}

/// `(sell - buy) / buy * 100`, `None` on overflow or a zero buy price
fn spread_percent(buy: Decimal, sell: Decimal) -> Option<Decimal> {
    sell.checked_sub(buy)?
        .checked_div(buy)?
        .checked_mul(Decimal::ONE_HUNDRED)
}
