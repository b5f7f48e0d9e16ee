//! Health check and metrics HTTP server

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{MonitorError, Result};
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind up front so a taken port fails startup
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| MonitorError::Io(format!("Failed to bind health server on {addr}: {e}")))?;
    info!(addr = %addr, "Health check server bound");
    Ok(listener)
}

/// Serve until the shutdown signal flips
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let now = Utc::now();
    let venues = state
        .store
        .fresh_counts(now, state.config.max_snapshot_age());

    Json(serde_json::json!({
        "status": "healthy",
        "component": "spread-monitor",
        "timestamp": now.to_rfc3339(),
        "venues": venues,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => body.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::Metrics;
    use crate::snapshot::{Bbo, SnapshotStore};
    use rust_decimal_macros::dec;

    async fn spawn_server() -> (String, Arc<AppState>, watch::Sender<bool>) {
        let state = Arc::new(AppState {
            store: Arc::new(SnapshotStore::new()),
            metrics: Metrics::new().unwrap(),
            config: Arc::new(Config::default()),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = watch::channel(false);
        tokio::spawn(serve(listener, state.clone(), rx));
        (base, state, tx)
    }

    #[tokio::test]
    async fn test_health_reports_fresh_counts() {
        let (base, state, _tx) = spawn_server().await;
        state.store.register("okx", "ETH/USDT");
        state.store.put(
            "binance",
            "BTC/USDT",
            Bbo {
                bid: dec!(100),
                bid_size: dec!(1),
                ask: dec!(101),
                ask_size: dec!(1),
                observed_at: Utc::now(),
            },
        );

        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["venues"]["binance"], 1);
        assert_eq!(body["venues"]["okx"], 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (base, state, tx) = spawn_server().await;
        state.metrics.ticks.inc();

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert!(response.status().is_success());
        let text = response.text().await.unwrap();
        assert!(text.contains("spread_ticks_total 1"));

        tx.send(true).unwrap();
    }
}
