//! WebSocket client for venue streams
//!
//! Handles connection, subscription, and message reception.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MonitorError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on the TCP, TLS and WebSocket handshake plus subscription sends
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    url: String,
    subscriptions: Vec<String>,
    connect_timeout: Duration,
}

impl WebSocketClient {
    /// Create a client that sends `subscriptions` after every connect
    pub fn new(url: &str, subscriptions: Vec<String>) -> Self {
        Self {
            stream: None,
            url: url.to_string(),
            subscriptions,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Connect to the endpoint and subscribe.
    ///
    /// A venue that does not finish the handshake within the connect timeout
    /// yields `ConnectionTimeout`.
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting to venue WebSocket");

        let ws_stream = timeout(self.connect_timeout, self.handshake())
            .await
            .map_err(|_| {
                warn!(url = %self.url, timeout_ms = self.connect_timeout.as_millis() as u64, "WebSocket handshake timed out");
                MonitorError::ConnectionTimeout
            })??;

        self.stream = Some(ws_stream);
        Ok(())
    }

    async fn handshake(&self) -> Result<WsStream> {
        let (mut ws_stream, response) = connect_async(&self.url).await.map_err(|e| {
            MonitorError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        for payload in &self.subscriptions {
            debug!(payload = %payload, "Sending subscription");
            ws_stream
                .send(Message::Text(payload.clone()))
                .await
                .map_err(|e| MonitorError::WebSocketMessage(e.to_string()))?;
        }

        Ok(ws_stream)
    }

    /// Receive the next data message; `None` for control frames
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MonitorError::WebSocketConnection("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => Ok(Some(String::from_utf8_lossy(&data).to_string())),
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                let _ = stream.send(Message::Pong(data)).await;
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MonitorError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(MonitorError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(MonitorError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    /// Send a keepalive frame
    pub async fn ping(&mut self, frame: Message) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .send(frame)
                .await
                .map_err(|e| MonitorError::WebSocketMessage(e.to_string()))?;
        }
        Ok(())
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
