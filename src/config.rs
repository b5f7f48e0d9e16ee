//! Configuration module for the spread monitor
//!
//! Settings come from a TOML file (path in `SPREAD_MONITOR_CONFIG`, default
//! `config.toml`) layered with `SPREAD_MONITOR__<KEY>` environment overrides.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{MonitorError, Result};

const CONFIG_PATH_VAR: &str = "SPREAD_MONITOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "SPREAD_MONITOR";

/// Supported venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    Binance,
    Bybit,
    Okx,
}

/// Whether a venue is accessed anonymously or with credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Public,
    Private,
}

/// How quotes are pulled from a venue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedTransport {
    #[default]
    WebSocket,
    Rest,
}

/// A single venue entry
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Unique display name, used as the venue key everywhere
    pub name: String,

    pub kind: VenueKind,

    #[serde(default)]
    pub mode: ConnectionMode,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub api_secret: Option<String>,

    /// Canonical `BASE/QUOTE` instruments listed on this venue
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub transport: FeedTransport,

    /// REST polling period when `transport = "rest"`
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overrides the venue's public WebSocket endpoint
    #[serde(default)]
    pub ws_endpoint: Option<String>,

    /// Overrides the venue's public REST endpoint
    #[serde(default)]
    pub rest_endpoint: Option<String>,
}

impl VenueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Notification sink entry
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Lark { webhook_url: String },
    Telegram { bot_token: String, chat_id: String },
    Discord { webhook_url: String },
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Lark { .. } => "lark",
            SinkConfig::Telegram { .. } => "telegram",
            SinkConfig::Discord { .. } => "discord",
        }
    }

    fn has_endpoint(&self) -> bool {
        match self {
            SinkConfig::Lark { webhook_url } | SinkConfig::Discord { webhook_url } => {
                !webhook_url.trim().is_empty()
            }
            SinkConfig::Telegram { bot_token, chat_id } => {
                !bot_token.trim().is_empty() && !chat_id.trim().is_empty()
            }
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub venues: Vec<VenueConfig>,

    /// Explicit instrument universe; when empty the universe is the
    /// intersection of every venue's `symbols` quoted in `quote_asset`
    #[serde(default)]
    pub instruments: Vec<String>,

    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Alert threshold in percent
    #[serde(default = "default_min_spread")]
    pub min_spread: Decimal,

    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    /// Cooldown per instrument and venue pair
    #[serde(default = "default_alert_interval_secs")]
    pub alert_interval_secs: u64,

    #[serde(default = "default_periodic_alert_interval_secs")]
    pub periodic_alert_interval_secs: u64,

    /// Snapshots older than this many evaluation ticks are ignored
    #[serde(default = "default_stale_after_ticks")]
    pub stale_after_ticks: u32,

    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Base delay for feed reconnect backoff
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Health/metrics server port, 0 disables it
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    #[serde(default = "default_log_json")]
    pub log_json: bool,
}

impl Config {
    /// Load configuration from the file named by `SPREAD_MONITOR_CONFIG`
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    /// Load and validate configuration from a TOML file plus environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MonitorError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields before the engine starts
    pub fn validate(&self) -> Result<()> {
        if self.venues.len() < 2 {
            return Err(MonitorError::ConfigError(format!(
                "At least two venues are required, got {}",
                self.venues.len()
            )));
        }

        let mut names = BTreeSet::new();
        for venue in &self.venues {
            if venue.name.trim().is_empty() {
                return Err(MonitorError::ConfigError(
                    "Venue name is required".to_string(),
                ));
            }
            if !names.insert(venue.name.as_str()) {
                return Err(MonitorError::ConfigError(format!(
                    "Duplicate venue name: {}",
                    venue.name
                )));
            }
            if venue.mode == ConnectionMode::Private {
                let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
                if !present(&venue.api_key) || !present(&venue.api_secret) {
                    return Err(MonitorError::ConfigError(format!(
                        "API credentials are required for private mode venue {}",
                        venue.name
                    )));
                }
            }
            if venue.transport == FeedTransport::Rest && venue.poll_interval_ms == 0 {
                return Err(MonitorError::ConfigError(format!(
                    "poll_interval_ms must be positive for venue {}",
                    venue.name
                )));
            }
            for symbol in &venue.symbols {
                normalize_instrument(symbol)?;
            }
        }

        if self.sinks.is_empty() {
            return Err(MonitorError::ConfigError(
                "No notification sinks configured".to_string(),
            ));
        }
        if let Some(sink) = self.sinks.iter().find(|s| !s.has_endpoint()) {
            return Err(MonitorError::ConfigError(format!(
                "Sink {} is missing endpoint data",
                sink.kind()
            )));
        }

        for (name, value) in [
            ("evaluation_interval_secs", self.evaluation_interval_secs),
            ("alert_interval_secs", self.alert_interval_secs),
            ("periodic_alert_interval_secs", self.periodic_alert_interval_secs),
            ("dispatch_timeout_ms", self.dispatch_timeout_ms),
        ] {
            if value == 0 {
                return Err(MonitorError::ConfigError(format!("{name} must be positive")));
            }
        }
        if self.stale_after_ticks == 0 {
            return Err(MonitorError::ConfigError(
                "stale_after_ticks must be at least 1".to_string(),
            ));
        }
        for instrument in &self.instruments {
            normalize_instrument(instrument)?;
        }

        Ok(())
    }

    /// Resolve the instrument universe, sorted and deduplicated
    pub fn universe(&self) -> Result<Vec<String>> {
        let universe: BTreeSet<String> = if !self.instruments.is_empty() {
            self.instruments
                .iter()
                .map(|s| normalize_instrument(s))
                .collect::<Result<_>>()?
        } else {
            let suffix = format!("/{}", self.quote_asset.trim().to_uppercase());
            let mut common: Option<BTreeSet<String>> = None;
            for venue in &self.venues {
                let symbols: BTreeSet<String> = venue
                    .symbols
                    .iter()
                    .map(|s| normalize_instrument(s))
                    .collect::<Result<BTreeSet<_>>>()?
                    .into_iter()
                    .filter(|s| s.ends_with(&suffix))
                    .collect();
                common = Some(match common {
                    None => symbols,
                    Some(acc) => acc.intersection(&symbols).cloned().collect(),
                });
            }
            common.unwrap_or_default()
        };

        if universe.is_empty() {
            return Err(MonitorError::EmptyUniverse);
        }
        Ok(universe.into_iter().collect())
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_secs)
    }

    pub fn periodic_alert_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_alert_interval_secs)
    }

    /// Age beyond which a snapshot no longer takes part in spread computation
    pub fn max_snapshot_age(&self) -> Duration {
        self.evaluation_interval() * self.stale_after_ticks
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            instruments: Vec::new(),
            quote_asset: default_quote_asset(),
            min_spread: default_min_spread(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            alert_interval_secs: default_alert_interval_secs(),
            periodic_alert_interval_secs: default_periodic_alert_interval_secs(),
            stale_after_ticks: default_stale_after_ticks(),
            sinks: Vec::new(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            health_port: default_health_port(),
            log_json: default_log_json(),
        }
    }
}

/// Canonicalize an instrument to upper-case `BASE/QUOTE`.
///
/// Accepts `/`, `-` or `_` as the separator.
pub fn normalize_instrument(raw: &str) -> Result<String> {
    let upper = raw.trim().to_uppercase();
    let (base, quote) = upper
        .split_once(&['/', '-', '_'][..])
        .ok_or_else(|| MonitorError::ConfigError(format!("Instrument must be BASE/QUOTE: {raw}")))?;
    if base.is_empty() || quote.is_empty() {
        return Err(MonitorError::ConfigError(format!(
            "Instrument must be BASE/QUOTE: {raw}"
        )));
    }
    Ok(format!("{base}/{quote}"))
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_min_spread() -> Decimal {
    Decimal::new(5, 1)
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_alert_interval_secs() -> u64 {
    300
}

fn default_periodic_alert_interval_secs() -> u64 {
    3600
}

fn default_stale_after_ticks() -> u32 {
    3
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_grace_ms() -> u64 {
    3000
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_health_port() -> u16 {
    9090
}

fn default_log_json() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const BASE: &str = r#"
        [[venues]]
        name = "binance"
        kind = "binance"
        symbols = ["BTC/USDT", "ETH/USDT", "SOL/BTC"]

        [[venues]]
        name = "okx"
        kind = "okx"
        transport = "rest"
        symbols = ["btc-usdt", "ETH/USDT", "XRP/USDT"]

        [[sinks]]
        type = "telegram"
        bot_token = "token"
        chat_id = "42"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(BASE).unwrap();
        assert_eq!(config.min_spread, dec!(0.5));
        assert_eq!(config.evaluation_interval(), Duration::from_secs(60));
        assert_eq!(config.alert_interval(), Duration::from_secs(300));
        assert_eq!(config.periodic_alert_interval(), Duration::from_secs(3600));
        assert_eq!(config.max_snapshot_age(), Duration::from_secs(180));
        assert_eq!(config.venues[0].mode, ConnectionMode::Public);
        assert_eq!(config.venues[0].transport, FeedTransport::WebSocket);
        assert_eq!(config.venues[1].transport, FeedTransport::Rest);
        assert_eq!(config.venues[1].kind, VenueKind::Okx);
    }

    #[test]
    fn test_universe_is_quote_filtered_intersection() {
        let config = Config::from_toml(BASE).unwrap();
        let universe = config.universe().unwrap();
        assert_eq!(universe, vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]);
    }

    #[test]
    fn test_explicit_instruments_win() {
        let raw = format!("instruments = [\"sol-usdt\"]\n{BASE}");
        let config = Config::from_toml(&raw).unwrap();
        assert_eq!(config.universe().unwrap(), vec!["SOL/USDT".to_string()]);
    }

    #[test]
    fn test_empty_universe_is_fatal() {
        let raw = BASE.replace("\"XRP/USDT\"", "").replace("\"btc-usdt\", \"ETH/USDT\",", "");
        let config = Config::from_toml(&raw).unwrap();
        assert!(matches!(config.universe(), Err(MonitorError::EmptyUniverse)));
    }

    #[test]
    fn test_private_mode_requires_credentials() {
        let raw = BASE.replacen("kind = \"binance\"", "kind = \"binance\"\nmode = \"private\"", 1);
        let err = Config::from_toml(&raw).unwrap_err();
        assert!(err.to_string().contains("API credentials"));

        let raw = BASE.replacen(
            "kind = \"binance\"",
            "kind = \"binance\"\nmode = \"private\"\napi_key = \"k\"\napi_secret = \"s\"",
            1,
        );
        assert!(Config::from_toml(&raw).is_ok());
    }

    #[test]
    fn test_rejects_single_venue_and_missing_sinks() {
        let single = r#"
            [[venues]]
            name = "binance"
            kind = "binance"

            [[sinks]]
            type = "lark"
            webhook_url = "https://example.invalid/hook"
        "#;
        assert!(Config::from_toml(single).is_err());

        let no_sinks = BASE.split("[[sinks]]").next().unwrap().to_string();
        let err = Config::from_toml(&no_sinks).unwrap_err();
        assert!(err.to_string().contains("sinks"));
    }

    #[test]
    fn test_rejects_invalid_mode() {
        let raw = BASE.replacen("kind = \"okx\"", "kind = \"okx\"\nmode = \"trading\"", 1);
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "min_spread = 1.25\nalert_interval_secs = 10\n{BASE}").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.min_spread, dec!(1.25));
        assert_eq!(config.alert_interval(), Duration::from_secs(10));
        assert!(Config::from_file("/nonexistent/spread.toml").is_err());
    }

    #[test]
    fn test_normalize_instrument() {
        assert_eq!(normalize_instrument(" eth_usdt ").unwrap(), "ETH/USDT");
        assert!(normalize_instrument("ETHUSDT").is_err());
        assert!(normalize_instrument("/USDT").is_err());
    }
}
