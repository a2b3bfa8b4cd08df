//! Minimal Telegram Bot API client.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network/HTTP request failed
    #[error("network error: {message}")]
    Network { message: String },

    /// The Bot API answered but rejected the message
    #[error("telegram api rejected the message: {description}")]
    Api { description: String },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Client for the `sendMessage` Bot API method.
pub struct TelegramClient {
    client: Client,
    send_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DeliveryError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            send_url: format!("{TELEGRAM_API_BASE}/bot{bot_token}/sendMessage"),
        })
    }

    /// Sends a plain-text message to one chat.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.send_url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| DeliveryError::Network {
            message: format!("unreadable api response (status {status}): {e}"),
        })?;

        if body.ok {
            Ok(())
        } else {
            Err(DeliveryError::Api {
                description: body
                    .description
                    .unwrap_or_else(|| format!("status {status}")),
            })
        }
    }
}
