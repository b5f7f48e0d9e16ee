//! Alert policy
//!
//! Two independent mechanisms run on every tick:
//! threshold alerts debounced per (instrument, unordered venue pair), and a
//! periodic broadcast driven by its own timer.

mod message;

pub use message::{BroadcastSummary, Notification};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::spread::{InstrumentSpreads, SpreadOpportunity, VenuePair};

/// Debounce key; direction does not matter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub instrument: String,
    pub pair: VenuePair,
}

impl AlertKey {
    pub fn for_opportunity(opportunity: &SpreadOpportunity) -> Self {
        Self {
            instrument: opportunity.instrument.clone(),
            pair: opportunity.venue_pair(),
        }
    }
}

/// What the policy decided for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickDecision {
    pub notifications: Vec<Notification>,
    /// Threshold crossings held back by the cooldown
    pub suppressed: usize,
}

/// Owns the debounce and broadcast timers
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    min_spread: Decimal,
    alert_interval: Duration,
    periodic_interval: Duration,
    last_alert: HashMap<AlertKey, DateTime<Utc>>,
    last_broadcast: Option<DateTime<Utc>>,
}

impl AlertPolicy {
    pub fn new(min_spread: Decimal, alert_interval: Duration, periodic_interval: Duration) -> Self {
        Self {
            min_spread,
            alert_interval,
            periodic_interval,
            last_alert: HashMap::new(),
            last_broadcast: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.min_spread,
            config.alert_interval(),
            config.periodic_alert_interval(),
        )
    }

    /// Run both mechanisms over one tick's reports
    pub fn on_tick(&mut self, reports: &[InstrumentSpreads], now: DateTime<Utc>) -> TickDecision {
        let mut decision = TickDecision::default();

        for report in reports {
            let (alerts, suppressed) = self.threshold_alerts(&report.opportunities, now);
            decision.suppressed += suppressed;
            decision
                .notifications
                .extend(alerts.into_iter().map(Notification::SpreadAlert));
        }

        if self.broadcast_due(now) {
            self.last_broadcast = Some(now);
            decision
                .notifications
                .push(Notification::Broadcast(BroadcastSummary::new(now, reports)));
        }

        decision
    }

    /// Opportunities at or above the threshold whose key is out of cooldown.
    ///
    /// Returns the emitted alerts and the number suppressed. Emitting stamps
    /// the key with `now`, so a second direction of the same pair in the same
    /// tick is suppressed.
    pub fn threshold_alerts(
        &mut self,
        opportunities: &[SpreadOpportunity],
        now: DateTime<Utc>,
    ) -> (Vec<SpreadOpportunity>, usize) {
        let mut emitted = Vec::new();
        let mut suppressed = 0;

        for opportunity in opportunities {
            if opportunity.spread_pct < self.min_spread {
                continue;
            }

            let key = AlertKey::for_opportunity(opportunity);
            if let Some(last) = self.last_alert.get(&key) {
                if elapsed(*last, now) < self.alert_interval {
                    debug!(
                        instrument = %key.instrument,
                        buy = %opportunity.buy_venue,
                        sell = %opportunity.sell_venue,
                        spread_pct = %opportunity.spread_pct,
                        "Alert suppressed by cooldown"
                    );
                    suppressed += 1;
                    continue;
                }
            }

            self.last_alert.insert(key, now);
            emitted.push(opportunity.clone());
        }

        (emitted, suppressed)
    }

    /// True if no broadcast has fired yet or the periodic interval has elapsed
    pub fn broadcast_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_broadcast {
            None => true,
            Some(last) => elapsed(last, now) >= self.periodic_interval,
        }
    }

    pub fn last_alert_at(&self, key: &AlertKey) -> Option<DateTime<Utc>> {
        self.last_alert.get(key).copied()
    }

    pub fn last_broadcast_at(&self) -> Option<DateTime<Utc>> {
        self.last_broadcast
    }
}

/// Time from `since` to `now`; a clock that went backwards counts as zero
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
