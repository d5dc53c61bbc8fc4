//! Telegram Bot API sink.
//!
//! Sends each alert to every subscribed chat with `sendMessage`, all chats
//! concurrently. A chat that fails is logged and skipped; nothing retries.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, warn};

use super::AlertSink;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TelegramNotifier {
    http: Client,
    api_base: String,
    bot_token: SecretString,
    chat_ids: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_ids: Vec<String>, api_base: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(SEND_TIMEOUT)
            .user_agent("BREAKSCAN/0.1.0")
            .build()?;

        Ok(Self {
            http,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            bot_token,
            chat_ids,
        })
    }

    pub fn subscribers(&self) -> usize {
        self.chat_ids.len()
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token.expose_secret())
    }

    async fn send_one(&self, url: &str, chat_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("Telegram returned {status}: {detail}");
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    /// Fails only if every chat failed.
    async fn deliver(&self, text: &str) -> Result<()> {
        if self.chat_ids.is_empty() {
            debug!("No Telegram subscribers, dropping alert");
            return Ok(());
        }

        let url = self.send_url();
        let sends = self.chat_ids.iter().map(|cid| self.send_one(&url, cid, text));
        let results = join_all(sends).await;

        let mut failed = 0usize;
        for (cid, result) in self.chat_ids.iter().zip(results) {
            if let Err(e) = result {
                // The error text can contain the request URL, and with it the token.
                let e = e.to_string().replace(self.bot_token.expose_secret(), "***");
                warn!(chat_id = %cid, error = %e, "Telegram send failed");
                failed += 1;
            }
        }

        if failed == self.chat_ids.len() {
            bail!("all {failed} Telegram chats failed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
