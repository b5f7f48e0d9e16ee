//! Error types for the spread monitor

use thiserror::Error;

/// Spread monitor errors
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Venue {venue} rejected request: {message}")]
    VenueRejected { venue: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No instruments shared across venues")]
    EmptyUniverse,

    #[error("Sink {sink} delivery failed: {reason}")]
    Delivery { sink: String, reason: String },

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for MonitorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MonitorError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::RestApiError(err.to_string())
    }
}

impl From<config::ConfigError> for MonitorError {
    fn from(err: config::ConfigError) -> Self {
        MonitorError::ConfigError(err.to_string())
    }
}

impl From<prometheus::Error> for MonitorError {
    fn from(err: prometheus::Error) -> Self {
        MonitorError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
