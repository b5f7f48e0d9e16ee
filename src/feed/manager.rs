//! WebSocket feed manager
//!
//! Handles reconnection logic and message dispatch for one venue.

use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::{FeedContext, WebSocketClient};
use crate::error::{MonitorError, Result};
use crate::parser::ParsedMessage;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;
/// Cooldown period after which reconnect attempts are reset (5 minutes)
const RECONNECT_COOLDOWN_SECS: u64 = 300;
/// Application keepalive period; Bybit drops sessions silent for 30s
const KEEPALIVE_SECS: u64 = 20;
/// No data for this long means the connection is stale
const STALE_CONNECTION_SECS: u64 = 60;

/// Keeps one venue's WebSocket feed alive with automatic reconnection
pub struct FeedManager {
    context: FeedContext,
    client: WebSocketClient,
    reconnect_delay_ms: u64,
    reconnect_attempts: u32,
    last_successful_connection: Option<Instant>,
}

impl FeedManager {
    pub fn new(context: FeedContext, reconnect_delay_ms: u64) -> Self {
        let symbols = context.venue_symbols();
        let kind = context.venue.kind;
        let url = kind.stream_url(context.ws_endpoint(), &symbols);
        let client = WebSocketClient::new(&url, kind.subscribe_messages(&symbols));

        Self {
            context,
            client,
            reconnect_delay_ms,
            reconnect_attempts: 0,
            last_successful_connection: None,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.client = self.client.with_connect_timeout(connect_timeout);
        self
    }

    /// Run until shutdown, reconnecting after every failure
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let venue = self.context.venue.name.clone();
        if self.context.venue_symbols().is_empty() {
            warn!(venue = %venue, "No instruments to follow, feed idle");
            return;
        }
        info!(venue = %venue, "Starting WebSocket feed with infinite retry");

        loop {
            // Reset reconnect attempts if we've been stable for a while
            if let Some(last_success) = self.last_successful_connection {
                if last_success.elapsed() > Duration::from_secs(RECONNECT_COOLDOWN_SECS)
                    && self.reconnect_attempts > 0
                {
                    info!(
                        venue = %venue,
                        previous_attempts = self.reconnect_attempts,
                        "Resetting reconnect counter after cooldown period"
                    );
                    self.reconnect_attempts = 0;
                }
            }

            let delay = match self.connect_and_process(&mut shutdown).await {
                Ok(()) if *shutdown.borrow() => break,
                Ok(()) => {
                    info!(venue = %venue, "Feed completed normally, reconnecting...");
                    Duration::from_secs(1)
                }
                Err(e) => {
                    error!(venue = %venue, error = %e, "Feed error");
                    self.reconnect_attempts += 1;
                    self.context
                        .metrics
                        .feed_reconnects
                        .with_label_values(&[venue.as_str()])
                        .inc();

                    let delay = backoff_delay(self.reconnect_delay_ms, self.reconnect_attempts);
                    warn!(
                        venue = %venue,
                        attempt = self.reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );
                    delay
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.client.close().await;
        info!(venue = %venue, "Feed stopped");
    }

    /// Connect and process messages until error or shutdown
    async fn connect_and_process(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        tokio::select! {
            connected = self.client.connect() => connected?,
            _ = shutdown.changed() => return Ok(()),
        }

        self.last_successful_connection = Some(Instant::now());
        info!(
            venue = %self.context.venue.name,
            symbols = self.context.venue_symbols().len(),
            "WebSocket connected and subscribed"
        );

        let mut keepalive = interval(Duration::from_secs(KEEPALIVE_SECS));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_message = Instant::now();
        let stale_after = Duration::from_secs(STALE_CONNECTION_SECS);

        loop {
            tokio::select! {
                received = self.client.recv() => match received? {
                    Some(text) => {
                        last_message = Instant::now();
                        if let Err(e) = self.process_message(&text) {
                            warn!(venue = %self.context.venue.name, error = %e, "Failed to process message");
                        }
                    }
                    // Ping/pong or other non-data frame
                    None => continue,
                },
                _ = keepalive.tick() => {
                    if last_message.elapsed() > stale_after {
                        warn!(
                            venue = %self.context.venue.name,
                            last_message_secs = last_message.elapsed().as_secs(),
                            "No message received within timeout, reconnecting"
                        );
                        self.client.close().await;
                        return Err(MonitorError::ConnectionTimeout);
                    }
                    let frame = self.context.venue.kind.ping_message();
                    if let Err(e) = self.client.ping(frame).await {
                        warn!(venue = %self.context.venue.name, error = %e, "Failed to send keepalive ping");
                        return Err(e);
                    }
                }
                _ = shutdown.changed() => {
                    self.client.close().await;
                    return Ok(());
                }
            }
        }
    }

    /// Process a single WebSocket message
    fn process_message(&self, raw: &str) -> Result<()> {
        match ParsedMessage::parse(self.context.venue.kind, raw)? {
            ParsedMessage::Quote(quote) => {
                self.context.apply(quote);
            }
            ParsedMessage::Control(msg) => {
                debug!(venue = %self.context.venue.name, msg = %msg, "Control message");
            }
            ParsedMessage::Unknown(msg) => {
                trace!(venue = %self.context.venue.name, msg = %msg, "Unknown message type");
            }
        }
        Ok(())
    }
}

/// Exponential backoff from `base_ms`, capped at `MAX_BACKOFF_MS`
fn backoff_delay(base_ms: u64, attempts: u32) -> Duration {
    let base_delay = base_ms.saturating_mul(2u64.pow(attempts.min(6)));
    Duration::from_millis(base_delay.min(MAX_BACKOFF_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionMode, FeedTransport, VenueConfig, VenueKind};
    use crate::metrics::Metrics;
    use crate::snapshot::SnapshotStore;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Accepts TCP connections and never writes a byte
    async fn silent_listener() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("ws://{addr}")
    }

    fn manager(endpoint: String, metrics: Metrics) -> FeedManager {
        let venue = VenueConfig {
            name: "binance".to_string(),
            kind: VenueKind::Binance,
            mode: ConnectionMode::Public,
            api_key: None,
            api_secret: None,
            symbols: vec!["BTC/USDT".to_string()],
            transport: FeedTransport::WebSocket,
            poll_interval_ms: 1000,
            ws_endpoint: Some(endpoint),
            rest_endpoint: None,
        };
        let context = FeedContext::new(
            venue,
            &["BTC/USDT".to_string()],
            Arc::new(SnapshotStore::new()),
            metrics,
        )
        .unwrap();
        FeedManager::new(context, 100)
    }

    #[tokio::test]
    async fn test_shutdown_stops_feed_stuck_in_handshake() {
        let endpoint = silent_listener().await;
        let mut feed = manager(endpoint, Metrics::new().unwrap());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { feed.run(rx).await });

        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(true).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(stopped.is_ok(), "feed still running after shutdown");
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out_and_retries() {
        let endpoint = silent_listener().await;
        let metrics = Metrics::new().unwrap();
        let mut feed = manager(endpoint, metrics.clone())
            .with_connect_timeout(Duration::from_millis(200));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { feed.run(rx).await });

        let reconnects = metrics.feed_reconnects.with_label_values(&["binance"]);
        for _ in 0..100 {
            if reconnects.get() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(reconnects.get() >= 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(1000, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(1000, 6), Duration::from_secs(60));
        assert_eq!(backoff_delay(1000, 40), Duration::from_secs(60));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(400));
    }
}
