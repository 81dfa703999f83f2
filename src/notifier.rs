//! Notification delivery for feedwatch.
//!
//! The poller talks to a [`Notifier`] capability; the shipped implementation
//! posts messages to the Telegram Bot API. Delivery is fire-and-forget:
//! failures are logged here and never surface to the polling pipeline.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::feed::types::MatchedItem;
use crate::{FeedwatchError, Result};

/// Request timeout for delivery calls in seconds.
const SEND_TIMEOUT_SECS: u64 = 10;

/// Message sink consumed by the poller.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a text message to a chat. Implementations log their own
    /// failures; the caller proceeds regardless of the outcome.
    async fn send(&self, chat_id: i64, text: &str);
}

/// Notifier that delivers messages through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
}

impl TelegramNotifier {
    /// Create a notifier for the given bot token.
    pub fn new(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(FeedwatchError::Config(
                "telegram bot token is empty".to_string(),
            ));
        }
        Self::with_api_url(format!("https://api.telegram.org/bot{token}"))
    }

    /// Create a notifier against a custom API base URL (useful for testing).
    pub fn with_api_url(api_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedwatchError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, api_url })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) {
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let result = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(chat_id, "notification delivered");
            }
            Ok(response) => {
                warn!(chat_id, status = %response.status(), "telegram rejected message");
            }
            Err(e) => {
                warn!(chat_id, error = %e, "failed to deliver notification");
            }
        }
    }
}

/// Format a matched item as a notification message.
pub fn format_notification(feed_name: &str, item: &MatchedItem) -> String {
    let mut text = format!("[{feed_name}]\n\n{}", item.title);
    if !item.description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&item.description);
    }
    if !item.link.is_empty() {
        text.push_str("\n\n");
        text.push_str(&item.link);
    }
    text
}
