//! Dispatcher module
//!
//! Fans rendered messages out to every configured sink. Each sink gets its
//! own bounded timeout and its failure never reaches the caller.

mod sinks;

pub use sinks::{build_sinks, DiscordSink, LarkSink, TelegramSink};

use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::Metrics;

/// A notification channel that accepts pre-rendered text
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &str) -> Result<()>;
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
    TimedOut,
}

impl DeliveryStatus {
    fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed(_) => "failed",
            DeliveryStatus::TimedOut => "timeout",
        }
    }
}

/// Per-sink outcome of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub sink: String,
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

/// Delivers messages to a fixed set of sinks
pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>, timeout: Duration) -> Self {
        Self {
            sinks,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Attempt delivery to every sink concurrently; never fails.
    ///
    /// No retry happens here, the next alert or broadcast is the retry point.
    pub async fn publish(&self, message: &str) -> Vec<DeliveryOutcome> {
        let deliveries = self.sinks.iter().map(|sink| self.deliver_one(sink.as_ref(), message));
        join_all(deliveries).await
    }

    async fn deliver_one(&self, sink: &dyn Sink, message: &str) -> DeliveryOutcome {
        let status = match timeout(self.timeout, sink.deliver(message)).await {
            Ok(Ok(())) => {
                debug!(sink = %sink.name(), len = message.len(), "Message delivered");
                DeliveryStatus::Delivered
            }
            Ok(Err(e)) => {
                warn!(sink = %sink.name(), error = %e, "Sink delivery failed");
                DeliveryStatus::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    sink = %sink.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Sink delivery timed out"
                );
                DeliveryStatus::TimedOut
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .sink_deliveries
                .with_label_values(&[sink.name(), status.label()])
                .inc();
        }

        DeliveryOutcome {
            sink: sink.name().to_string(),
            status,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingSink, RecordingSink, StalledSink};
    use super::*;

    #[tokio::test]
    async fn test_failing_sink_does_not_affect_healthy_one() {
        let healthy = RecordingSink::new("healthy");
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(FailingSink), healthy.clone()];
        let dispatcher = Dispatcher::new(sinks, Duration::from_secs(1));

        let outcomes = dispatcher.publish("spread!").await;
        assert_eq!(outcomes.len(), 2);

        let failing = outcomes.iter().find(|o| o.sink == "failing").unwrap();
        assert!(matches!(failing.status, DeliveryStatus::Failed(ref reason) if reason.contains("502")));

        let ok = outcomes.iter().find(|o| o.sink == "healthy").unwrap();
        assert!(ok.is_success());
        assert_eq!(healthy.received(), vec!["spread!".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_is_bounded_by_timeout() {
        let healthy = RecordingSink::new("healthy");
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(StalledSink), healthy.clone()];
        let dispatcher = Dispatcher::new(sinks, Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        let outcomes = dispatcher.publish("hello").await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(outcomes[0].status, DeliveryStatus::TimedOut);
        assert!(outcomes[1].is_success());
    }

    #[tokio::test]
    async fn test_no_sinks_is_a_noop() {
        let dispatcher = Dispatcher::new(Vec::new(), Duration::from_secs(1));
        assert!(dispatcher.publish("anything").await.is_empty());
        assert_eq!(dispatcher.sink_count(), 0);
    }

    #[tokio::test]
    async fn test_outcomes_counted() {
        let metrics = Metrics::new().unwrap();
        let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(FailingSink), RecordingSink::new("ok")];
        let dispatcher =
            Dispatcher::new(sinks, Duration::from_secs(1)).with_metrics(metrics.clone());

        dispatcher.publish("x").await;
        dispatcher.publish("y").await;

        let failed = metrics
            .sink_deliveries
            .with_label_values(&["failing", "failed"])
            .get();
        let delivered = metrics
            .sink_deliveries
            .with_label_values(&["ok", "delivered"])
            .get();
        assert_eq!((failed, delivered), (2, 2));
    }
}
