//! Monitor loop
//!
//! Drives spread engine -> alert policy -> dispatcher on a fixed interval.
//! Publishing runs in background tasks so a slow sink never delays a tick.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alert::{AlertPolicy, Notification};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::metrics::Metrics;
use crate::snapshot::SnapshotStore;
use crate::spread::SpreadEngine;

pub struct SpreadMonitor {
    engine: SpreadEngine,
    policy: AlertPolicy,
    dispatcher: Arc<Dispatcher>,
    universe: Vec<String>,
    interval: Duration,
    shutdown_grace: Duration,
    metrics: Metrics,
}

impl SpreadMonitor {
    pub fn new(
        engine: SpreadEngine,
        policy: AlertPolicy,
        dispatcher: Arc<Dispatcher>,
        universe: Vec<String>,
        interval: Duration,
        shutdown_grace: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            engine,
            policy,
            dispatcher,
            universe,
            interval,
            shutdown_grace,
            metrics,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<SnapshotStore>,
        dispatcher: Arc<Dispatcher>,
        universe: Vec<String>,
        metrics: Metrics,
    ) -> Self {
        Self::new(
            SpreadEngine::new(store, config.max_snapshot_age()),
            AlertPolicy::from_config(config),
            dispatcher,
            universe,
            config.evaluation_interval(),
            config.shutdown_grace(),
            metrics,
        )
    }

    /// Evaluate every instrument and decide what to send
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        let reports = self.engine.evaluate_all(&self.universe, now);
        let decision = self.policy.on_tick(&reports, now);

        self.metrics.ticks.inc();
        self.metrics.alerts_suppressed.inc_by(decision.suppressed as u64);

        for notification in &decision.notifications {
            match notification {
                Notification::SpreadAlert(opportunity) => {
                    self.metrics.alerts_emitted.inc();
                    info!(
                        instrument = %opportunity.instrument,
                        buy = %opportunity.buy_venue,
                        sell = %opportunity.sell_venue,
                        spread_pct = %opportunity.spread_pct.round_dp(4),
                        volume = %opportunity.tradable_volume,
                        "Spread alert"
                    );
                }
                Notification::Broadcast(summary) => {
                    self.metrics.broadcasts.inc();
                    info!(
                        instruments = summary.instruments.len(),
                        has_data = summary.has_data(),
                        "Periodic broadcast"
                    );
                }
            }
        }

        debug!(
            instruments = reports.len(),
            opportunities = reports.iter().map(|r| r.opportunities.len()).sum::<usize>(),
            suppressed = decision.suppressed,
            "Tick evaluated"
        );

        decision.notifications
    }

    /// Tick until shutdown, then give in-flight publishes the grace period.
    ///
    /// The first tick comes one interval after start so feeds have had time
    /// to fill the store before the first broadcast.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!(
            instruments = self.universe.len(),
            interval_secs = self.interval.as_secs(),
            sinks = self.dispatcher.sink_count(),
            "Starting monitor loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
                _ = shutdown.changed() => break,
            }

            let notifications = self.tick(Utc::now());
            if notifications.is_empty() {
                continue;
            }

            // One task per tick keeps alerts ahead of the broadcast
            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move {
                for notification in notifications {
                    let outcomes = dispatcher.publish(&notification.render()).await;
                    let delivered = outcomes.iter().filter(|o| o.is_success()).count();
                    debug!(
                        kind = notification.kind(),
                        delivered,
                        sinks = outcomes.len(),
                        "Notification published"
                    );
                }
            });
        }

        self.drain(in_flight).await;
        info!("Monitor loop stopped");
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        let pending = in_flight.len();
        info!(pending, grace_ms = self.shutdown_grace.as_millis() as u64, "Waiting for in-flight notifications");

        let drained = timeout(self.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(pending = in_flight.len(), "Abandoning in-flight notifications after grace period");
            in_flight.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{RecordingSink, StalledSink};
    use crate::dispatch::Sink;
    use crate::snapshot::Bbo;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const EVALUATION: Duration = Duration::from_secs(60);

    fn bbo(bid: Decimal, ask: Decimal, at: DateTime<Utc>) -> Bbo {
        Bbo {
            bid,
            bid_size: dec!(1),
            ask,
            ask_size: dec!(1),
            observed_at: at,
        }
    }

    fn monitor(store: Arc<SnapshotStore>, sinks: Vec<Arc<dyn Sink>>, metrics: Metrics) -> SpreadMonitor {
        let dispatcher = Dispatcher::new(sinks, Duration::from_secs(3600)).with_metrics(metrics.clone());
        SpreadMonitor::new(
            SpreadEngine::new(store, EVALUATION * 3),
            AlertPolicy::new(dec!(0.5), Duration::from_secs(300), Duration::from_secs(3600)),
            Arc::new(dispatcher),
            vec!["BTC/USDT".to_string()],
            EVALUATION,
            Duration::from_millis(100),
            metrics,
        )
    }

    #[test]
    fn test_tick_wires_engine_and_policy() {
        let store = Arc::new(SnapshotStore::new());
        let metrics = Metrics::new().unwrap();
        let mut monitor = monitor(store.clone(), Vec::new(), metrics.clone());
        let now = Utc::now();

        // Buy on a at 100, sell on b at 101: +1%
        store.put("a", "BTC/USDT", bbo(dec!(99), dec!(100), now));
        store.put("b", "BTC/USDT", bbo(dec!(101), dec!(102), now));

        let notifications = monitor.tick(now);
        let kinds: Vec<_> = notifications.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["spread_alert", "broadcast"]);
        match &notifications[0] {
            Notification::SpreadAlert(opportunity) => {
                assert_eq!(opportunity.buy_venue, "a");
                assert_eq!(opportunity.sell_venue, "b");
                assert_eq!(opportunity.spread_pct, dec!(1));
            }
            other => panic!("Expected alert, got {other:?}"),
        }

        // Same condition one tick later is debounced
        let notifications = monitor.tick(now + chrono::Duration::seconds(60));
        assert!(notifications.is_empty());

        assert_eq!(metrics.ticks.get(), 2);
        assert_eq!(metrics.alerts_emitted.get(), 1);
        assert_eq!(metrics.alerts_suppressed.get(), 1);
        assert_eq!(metrics.broadcasts.get(), 1);
    }

    #[test]
    fn test_stale_venue_produces_no_alert() {
        let store = Arc::new(SnapshotStore::new());
        let mut monitor = monitor(store.clone(), Vec::new(), Metrics::new().unwrap());
        let now = Utc::now();

        store.put("a", "BTC/USDT", bbo(dec!(99), dec!(100), now - chrono::Duration::seconds(600)));
        store.put("b", "BTC/USDT", bbo(dec!(110), dec!(111), now));

        let notifications = monitor.tick(now);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind(), "broadcast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_and_stops_on_shutdown() {
        let store = Arc::new(SnapshotStore::new());
        let recorder = RecordingSink::new("recorder");
        let sinks: Vec<Arc<dyn Sink>> = vec![recorder.clone()];
        let monitor = monitor(store, sinks, Metrics::new().unwrap());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(rx));

        tokio::time::sleep(EVALUATION + Duration::from_secs(1)).await;
        let received = recorder.received();
        assert_eq!(received.len(), 1);
        assert!(received[0].contains("No data"));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_broadcast_waits_for_feeds() {
        let store = Arc::new(SnapshotStore::new());
        let recorder = RecordingSink::new("recorder");
        let sinks: Vec<Arc<dyn Sink>> = vec![recorder.clone()];
        let monitor = monitor(store.clone(), sinks, Metrics::new().unwrap());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(rx));

        // Feeds land shortly after start
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.received().is_empty());
        let now = Utc::now();
        store.put("a", "BTC/USDT", bbo(dec!(100), dec!(100.1), now));
        store.put("b", "BTC/USDT", bbo(dec!(100.05), dec!(100.2), now));

        tokio::time::sleep(Duration::from_secs(59 * 60)).await;
        let received = recorder.received();
        assert_eq!(received.len(), 1);
        assert!(!received[0].contains("No data"));
        assert!(received[0].contains("BTC/USDT"));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_continue_while_publish_is_stuck() {
        let store = Arc::new(SnapshotStore::new());
        let metrics = Metrics::new().unwrap();
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(StalledSink)];
        let monitor = monitor(store, sinks, metrics.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(rx));

        // The first tick's broadcast never completes
        tokio::time::sleep(EVALUATION + Duration::from_secs(1)).await;
        assert_eq!(metrics.ticks.get(), 1);
        tokio::time::sleep(EVALUATION * 2).await;
        assert_eq!(metrics.ticks.get(), 3);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_stuck_publish_after_grace() {
        let store = Arc::new(SnapshotStore::new());
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(StalledSink)];
        let monitor = monitor(store, sinks, Metrics::new().unwrap());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(rx));
        tokio::time::sleep(EVALUATION + Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(started.elapsed() < EVALUATION);
    }
}
