//! REST polling feed for venues configured with `transport = "rest"`

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::FeedContext;
use crate::error::{MonitorError, Result};
use crate::parser::{parse_rest_quote, QuoteUpdate};

/// Bound on one top-of-book request, connect included
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for pollers, with the request timeout applied
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(request_timeout)
        .build()?)
}

/// Polls the venue's top-of-book endpoint for every followed symbol
pub struct RestPoller {
    context: FeedContext,
    client: reqwest::Client,
}

impl RestPoller {
    pub fn new(context: FeedContext, client: reqwest::Client) -> Self {
        Self { context, client }
    }

    /// Poll every `poll_interval_ms` until shutdown.
    ///
    /// A failed request is logged and retried on the next round.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let venue = &self.context.venue.name;
        let symbols = self.context.venue_symbols();
        if symbols.is_empty() {
            warn!(venue = %venue, "No instruments to follow, poller idle");
            return;
        }

        let mut ticker = interval(self.context.venue.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            venue = %venue,
            interval_ms = self.context.venue.poll_interval_ms,
            "Starting REST poller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = self.poll_round(&symbols) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(venue = %venue, "Poller stopped");
    }

    async fn poll_round(&self, symbols: &[String]) {
        for symbol in symbols {
            match self.fetch(symbol).await {
                Ok(quote) => {
                    self.context.apply(quote);
                }
                Err(e) => {
                    warn!(venue = %self.context.venue.name, symbol = %symbol, error = %e, "REST poll failed");
                }
            }
        }
    }

    async fn fetch(&self, symbol: &str) -> Result<QuoteUpdate> {
        let kind = self.context.venue.kind;
        let url = kind.rest_url(self.context.rest_endpoint(), symbol);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Venue rejections arrive as 4xx with a JSON body worth keeping
        match parse_rest_quote(kind, symbol, &body) {
            Ok(quote) if status.is_success() => Ok(quote),
            Err(e @ MonitorError::VenueRejected { .. }) => Err(e),
            Err(e) if status.is_success() => Err(e),
            _ => Err(MonitorError::RestApiError(format!("HTTP {status}: {body}"))),
        }
    }
}
