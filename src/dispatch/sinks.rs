//! HTTP notification sinks
//!
//! Lark and Discord take an incoming-webhook URL; Telegram goes through the
//! bot API `sendMessage` method.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::Sink;
use crate::config::SinkConfig;
use crate::error::{MonitorError, Result};

const TELEGRAM_API: &str = "https://api.telegram.org";
/// Message limits, in UTF-16 code units
const TELEGRAM_MAX_UNITS: usize = 4096;
const DISCORD_MAX_UNITS: usize = 2000;

/// Build one sink per config entry, named `<type>-<position>`
pub fn build_sinks(configs: &[SinkConfig], client: reqwest::Client) -> Vec<Arc<dyn Sink>> {
    configs
        .iter()
        .enumerate()
        .map(|(i, config)| {
            let name = format!("{}-{}", config.kind(), i + 1);
            info!(sink = %name, "Configured notification sink");
            let sink: Arc<dyn Sink> = match config {
                SinkConfig::Lark { webhook_url } => {
                    Arc::new(LarkSink::new(&name, client.clone(), webhook_url))
                }
                SinkConfig::Telegram { bot_token, chat_id } => {
                    Arc::new(TelegramSink::new(&name, client.clone(), bot_token, chat_id))
                }
                SinkConfig::Discord { webhook_url } => {
                    Arc::new(DiscordSink::new(&name, client.clone(), webhook_url))
                }
            };
            sink
        })
        .collect()
}

/// Lark (Feishu) custom bot webhook
pub struct LarkSink {
    name: String,
    client: reqwest::Client,
    webhook_url: String,
}

impl LarkSink {
    pub fn new(name: &str, client: reqwest::Client, webhook_url: &str) -> Self {
        Self {
            name: name.to_string(),
            client,
            webhook_url: webhook_url.to_string(),
        }
    }

    fn payload(message: &str) -> Value {
        json!({
            "msg_type": "text",
            "content": { "text": message }
        })
    }
}

#[async_trait]
impl Sink for LarkSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&Self::payload(message))
            .send()
            .await?;
        let body = check_status(&self.name, response).await?;

        // Lark answers 200 with a non-zero code on rejected payloads
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            let code = parsed
                .get("code")
                .or_else(|| parsed.get("StatusCode"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if code != 0 {
                return Err(MonitorError::Delivery {
                    sink: self.name.clone(),
                    reason: format!("Lark code {code}: {body}"),
                });
            }
        }
        Ok(())
    }
}

/// Telegram bot `sendMessage`
pub struct TelegramSink {
    name: String,
    client: reqwest::Client,
    api_url: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(name: &str, client: reqwest::Client, bot_token: &str, chat_id: &str) -> Self {
        Self {
            name: name.to_string(),
            client,
            api_url: format!("{TELEGRAM_API}/bot{bot_token}/sendMessage"),
            chat_id: chat_id.to_string(),
        }
    }

    fn payload(&self, text: &str) -> Value {
        json!({
            "chat_id": self.chat_id,
            "text": text,
        })
    }
}

#[async_trait]
impl Sink for TelegramSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &str) -> Result<()> {
        for chunk in split_message(message, TELEGRAM_MAX_UNITS) {
            let response = self
                .client
                .post(&self.api_url)
                .json(&self.payload(chunk))
                .send()
                .await?;
            check_status(&self.name, response).await?;
        }
        Ok(())
    }
}

/// Discord incoming webhook
pub struct DiscordSink {
    name: String,
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordSink {
    pub fn new(name: &str, client: reqwest::Client, webhook_url: &str) -> Self {
        Self {
            name: name.to_string(),
            client,
            webhook_url: webhook_url.to_string(),
        }
    }

    fn payload(content: &str) -> Value {
        json!({ "content": content })
    }
}

#[async_trait]
impl Sink for DiscordSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, message: &str) -> Result<()> {
        for chunk in split_message(message, DISCORD_MAX_UNITS) {
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&Self::payload(chunk))
                .send()
                .await?;
            check_status(&self.name, response).await?;
        }
        Ok(())
    }
}

/// Turn a non-2xx response into a delivery error, returning the body otherwise
async fn check_status(sink: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(MonitorError::Delivery {
            sink: sink.to_string(),
            reason: format!("HTTP {status}: {body}"),
        });
    }
    Ok(body)
}

/// Split `message` into chunks of at most `max_units` UTF-16 code units.
///
/// Chunks break after a newline where possible so a broadcast keeps whole
/// instrument lines; a single overlong line is cut between chars.
fn split_message(message: &str, max_units: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut units = 0;
    let mut last_newline = None;

    for (idx, ch) in message.char_indices() {
        let width = ch.len_utf16();
        if units + width > max_units {
            let end = last_newline.filter(|&end| end > start).unwrap_or(idx);
            chunks.push(&message[start..end]);
            start = end;
            units = message[start..idx].encode_utf16().count();
            last_newline = None;
            if units + width > max_units {
                chunks.push(&message[start..idx]);
                start = idx;
                units = 0;
            }
        }
        units += width;
        if ch == '\n' {
            last_newline = Some(idx + 1);
        }
    }
    if start < message.len() || chunks.is_empty() {
        chunks.push(&message[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lark_payload() {
        let payload = LarkSink::payload("hi");
        assert_eq!(payload["msg_type"], "text");
        assert_eq!(payload["content"]["text"], "hi");
    }

    #[test]
    fn test_telegram_payload_and_url() {
        let sink = TelegramSink::new("telegram-1", reqwest::Client::new(), "123:abc", "-100");
        assert_eq!(sink.api_url, "https://api.telegram.org/bot123:abc/sendMessage");
        let payload = sink.payload("hi");
        assert_eq!(payload["chat_id"], "-100");
        assert_eq!(payload["text"], "hi");
    }

    #[test]
    fn test_discord_payload() {
        let payload = DiscordSink::payload("hi");
        assert_eq!(payload["content"], "hi");
    }

    #[test]
    fn test_split_counts_utf16_units() {
        // Each emoji is one char but two UTF-16 units
        let long = "📊".repeat(TELEGRAM_MAX_UNITS);
        let chunks = split_message(&long, TELEGRAM_MAX_UNITS);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(chunk.encode_utf16().count(), TELEGRAM_MAX_UNITS);
        }
        assert_eq!(chunks.concat(), long);
    }

    #[test]
    fn test_split_breaks_on_lines_and_keeps_everything() {
        let report: String = (0..400)
            .map(|i| format!("🔸 INST{i}/USDT: bid 100.0000 ask 100.1000\n"))
            .collect();
        let chunks = split_message(&report, DISCORD_MAX_UNITS);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.encode_utf16().count() <= DISCORD_MAX_UNITS);
            assert!(chunk.ends_with('\n'));
        }
        assert_eq!(chunks.concat(), report);
    }

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(split_message("hi", DISCORD_MAX_UNITS), vec!["hi"]);
        assert_eq!(split_message("", DISCORD_MAX_UNITS), vec![""]);
    }

    #[test]
    fn test_build_sinks_names() {
        let configs = vec![
            SinkConfig::Lark {
                webhook_url: "https://example.invalid/lark".to_string(),
            },
            SinkConfig::Telegram {
                bot_token: "t".to_string(),
                chat_id: "1".to_string(),
            },
            SinkConfig::Discord {
                webhook_url: "https://example.invalid/discord".to_string(),
            },
        ];
        let sinks = build_sinks(&configs, reqwest::Client::new());
        let names: Vec<_> = sinks.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["lark-1", "telegram-2", "discord-3"]);
    }
}
