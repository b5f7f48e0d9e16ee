//! Spread Monitor
//!
//! Watches the best bid/offer of several venues, alerts on cross-venue spreads
//! above the threshold and broadcasts a periodic status report.

use anyhow::Context;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

use spread_monitor::config::Config;
use spread_monitor::dispatch::{build_sinks, Dispatcher};
use spread_monitor::feed::spawn_feeds;
use spread_monitor::metrics::Metrics;
use spread_monitor::monitor::SpreadMonitor;
use spread_monitor::snapshot::SnapshotStore;
use spread_monitor::{health, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    telemetry::init_tracing(config.log_json);
    info!("Starting Spread Monitor");

    config.validate().context("Invalid configuration")?;
    let universe = config.universe().context("Failed to resolve instrument universe")?;
    for venue in &config.venues {
        info!(venue = %venue.name, kind = venue.kind.as_str(), mode = ?venue.mode, "Venue configured");
    }
    info!(
        instruments = ?universe,
        min_spread = %config.min_spread,
        evaluation_secs = config.evaluation_interval_secs,
        "Configuration loaded"
    );

    let config = Arc::new(config);
    let metrics = Metrics::new().context("Failed to register metrics")?;
    let store = Arc::new(SnapshotStore::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start health check server
    if config.health_port != 0 {
        let listener = health::bind(config.health_port).await?;
        let state = Arc::new(AppState {
            store: store.clone(),
            metrics: metrics.clone(),
            config: config.clone(),
        });
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(listener, state, shutdown).await {
                warn!(error = %e, "Health server error");
            }
        });
    }

    // Start one feed per venue
    let feeds = spawn_feeds(
        &config.venues,
        &universe,
        store.clone(),
        metrics.clone(),
        config.reconnect_delay_ms,
        shutdown_rx.clone(),
    )?;

    let sinks = build_sinks(&config.sinks, reqwest::Client::new());
    let dispatcher =
        Arc::new(Dispatcher::new(sinks, config.dispatch_timeout()).with_metrics(metrics.clone()));
    let monitor = SpreadMonitor::from_config(&config, store, dispatcher, universe, metrics);
    let monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    wait_for_signal().await;
    info!("Shutdown signal received, stopping");
    let _ = shutdown_tx.send(true);

    if let Err(e) = monitor_handle.await {
        error!(error = %e, "Monitor task failed");
    }

    // Feeds race their I/O against shutdown; the grace bounds a wedged one
    let aborts: Vec<_> = feeds.iter().map(|feed| feed.abort_handle()).collect();
    match timeout(config.shutdown_grace(), join_all(feeds)).await {
        Ok(results) => {
            for e in results.into_iter().filter_map(|r| r.err()) {
                warn!(error = %e, "Feed task failed");
            }
        }
        Err(_) => {
            warn!(feeds = aborts.len(), "Feeds did not stop within grace period, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }

    info!("Spread Monitor stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
