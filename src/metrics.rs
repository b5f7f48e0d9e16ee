//! Prometheus counters for feeds, alerts and sink deliveries

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{MonitorError, Result};

/// Counters registered in a dedicated registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub quote_updates: IntCounterVec,
    pub feed_reconnects: IntCounterVec,
    pub ticks: IntCounter,
    pub alerts_emitted: IntCounter,
    pub alerts_suppressed: IntCounter,
    pub broadcasts: IntCounter,
    pub sink_deliveries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let quote_updates = IntCounterVec::new(
            Opts::new("spread_quote_updates_total", "BBO updates written to the store"),
            &["venue"],
        )?;
        let feed_reconnects = IntCounterVec::new(
            Opts::new("spread_feed_reconnects_total", "Feed reconnect attempts after errors"),
            &["venue"],
        )?;
        let ticks = IntCounter::new("spread_ticks_total", "Evaluation ticks run")?;
        let alerts_emitted = IntCounter::new(
            "spread_alerts_emitted_total",
            "Threshold alerts handed to the dispatcher",
        )?;
        let alerts_suppressed = IntCounter::new(
            "spread_alerts_suppressed_total",
            "Threshold crossings held back by the cooldown",
        )?;
        let broadcasts = IntCounter::new("spread_broadcasts_total", "Periodic broadcasts emitted")?;
        let sink_deliveries = IntCounterVec::new(
            Opts::new("spread_sink_deliveries_total", "Delivery attempts per sink and outcome"),
            &["sink", "outcome"],
        )?;

        registry.register(Box::new(quote_updates.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;
        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(alerts_emitted.clone()))?;
        registry.register(Box::new(alerts_suppressed.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(sink_deliveries.clone()))?;

        Ok(Self {
            registry,
            quote_updates,
            feed_reconnects,
            ticks,
            alerts_emitted,
            alerts_suppressed,
            broadcasts,
            sink_deliveries,
        })
    }

    /// Text exposition format for `/metrics`
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MonitorError::MetricsError(e.to_string()))
    }
}
