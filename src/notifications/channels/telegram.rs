//! Telegram bot channel
//!
//! Sends messages with the Bot API `sendMessage` method. The partition
//! routing key is used as the forum topic (`message_thread_id`) inside the
//! configured chat; an empty key posts to the chat's general thread.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult};
use crate::models::RoutingKey;

/// Telegram channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (`123456:ABC...`)
    pub bot_token: String,
    /// Target chat id (group or channel)
    pub chat_id: String,
    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Hide link previews under each message
    #[serde(default = "default_true")]
    pub disable_web_page_preview: bool,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
            disable_web_page_preview: true,
        }
    }

    /// Point the channel at another Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bot_token.trim().is_empty() {
            return Err("Telegram bot token cannot be empty".to_string());
        }

        if self.chat_id.trim().is_empty() {
            return Err("Telegram chat id cannot be empty".to_string());
        }

        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err("Telegram API base must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Subset of the Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Telegram notification channel
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Build the `sendMessage` body
    pub(crate) fn build_payload(
        &self,
        message: &str,
        route: &RoutingKey,
    ) -> ChannelResult<serde_json::Value> {
        let mut payload = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": message,
            "disable_web_page_preview": self.config.disable_web_page_preview,
        });

        if !route.is_empty() {
            let thread_id: i64 = route
                .as_str()
                .trim()
                .parse()
                .map_err(|_| ChannelError::InvalidRoute(route.to_string()))?;
            payload["message_thread_id"] = serde_json::json!(thread_id);
        }

        Ok(payload)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str, route: &RoutingKey) -> ChannelResult<()> {
        let payload = self.build_payload(message, route)?;

        // The endpoint embeds the bot token
        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::HttpError(e.without_url()))?;
        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();

        if status.is_success() && body.as_ref().map_or(true, |b| b.ok) {
            tracing::debug!(route = %route, "Telegram message delivered");
            return Ok(());
        }

        let description = body
            .as_ref()
            .and_then(|b| b.description.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = body
                .and_then(|b| b.parameters)
                .and_then(|p| p.retry_after);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        Err(ChannelError::Rejected(description))
    }

    async fn health_check(&self) -> ChannelResult<bool> {
        let url = format!(
            "{}/bot{}/getMe",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );
        match self.client.get(url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Telegram health check failed: {}", e.without_url());
                Ok(false)
            }
        }
    }
}
