//! Human-readable notification text

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::spread::{InstrumentSpreads, SpreadOpportunity};

/// Periodic status view over every instrument in the universe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub generated_at: DateTime<Utc>,
    /// Instruments with at least one fresh venue
    pub instruments: Vec<InstrumentSpreads>,
}

impl BroadcastSummary {
    pub fn new(generated_at: DateTime<Utc>, reports: &[InstrumentSpreads]) -> Self {
        Self {
            generated_at,
            instruments: reports
                .iter()
                .filter(|report| !report.venues.is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn has_data(&self) -> bool {
        !self.instruments.is_empty()
    }
}

/// Something the alert policy decided to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    SpreadAlert(SpreadOpportunity),
    Broadcast(BroadcastSummary),
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::SpreadAlert(_) => "spread_alert",
            Notification::Broadcast(_) => "broadcast",
        }
    }

    pub fn render(&self) -> String {
        match self {
            Notification::SpreadAlert(opportunity) => render_alert(opportunity),
            Notification::Broadcast(summary) => render_broadcast(summary),
        }
    }
}

fn render_alert(o: &SpreadOpportunity) -> String {
    format!(
        "🔔 Spread alert\n\
         Instrument: {}\n\
         Venues: {} -> {}\n\
         Spread: {:.2}%\n\
         Prices: buy {} / sell {}\n\
         Tradable volume: {}",
        o.instrument,
        o.buy_venue,
        o.sell_venue,
        o.spread_pct,
        o.buy_price.normalize(),
        o.sell_price.normalize(),
        o.tradable_volume.normalize(),
    )
}

fn render_broadcast(summary: &BroadcastSummary) -> String {
    let mut message = format!(
        "📊 Periodic spread report ({})\n",
        summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if !summary.has_data() {
        message.push_str("\nNo data: no venue has fresh quotes\n");
        return message;
    }

    // Writing into a String cannot fail
    for report in &summary.instruments {
        let _ = writeln!(message, "\n🔸 {}:", report.instrument);

        match report.best() {
            Some(best) => {
                let _ = writeln!(message, "Best spread: {:.2}%", best.spread_pct);
                let _ = writeln!(
                    message,
                    "Buy on {}, sell on {}",
                    best.buy_venue, best.sell_venue
                );
            }
            None => {
                let _ = writeln!(message, "Best spread: n/a (fewer than two venues)");
            }
        }

        message.push_str("Venue BBO:\n");
        for snapshot in &report.venues {
            let _ = write!(
                message,
                "{}: bid {:.4} ask {:.4}",
                snapshot.venue, snapshot.bid, snapshot.ask
            );
            match snapshot.own_spread_pct() {
                Some(pct) => {
                    let _ = writeln!(message, " (spread: {:.2}%)", pct);
                }
                None => message.push('\n'),
            }
        }
    }

    message
}
