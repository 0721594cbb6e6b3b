//! Delivery channels.
//!
//! The dispatcher only needs a binary outcome from a channel: delivered, or
//! failed with a reason. `TelegramChannel` talks to the Bot API; tests plug in
//! their own implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single delivery attempt failed. Every variant is retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by channel (status {status}): {description}")]
    Rejected { status: u16, description: String },
}

/// An outbound messaging channel.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Deliver `payload` to `target`.
    async fn deliver(&self, target: &str, payload: &str) -> Result<(), DeliveryError>;
}

/// Run one delivery attempt, treating a hung channel as a failure.
pub async fn deliver_with_timeout(
    channel: &dyn DeliveryChannel,
    target: &str,
    payload: &str,
    timeout: Duration,
) -> Result<(), DeliveryError> {
    match tokio::time::timeout(timeout, channel.deliver(target, payload)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout(timeout)),
    }
}

/// Request body for `sendMessage`.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Envelope returned by every Bot API method.
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

/// Telegram Bot API delivery channel.
pub struct TelegramChannel {
    client: reqwest::Client,
    send_url: String,
}

impl TelegramChannel {
    /// Build a channel whose HTTP client enforces `timeout` per request.
    pub fn new(api_url: &str, bot_token: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            send_url: send_message_url(api_url, bot_token),
        })
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn deliver(&self, target: &str, payload: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.send_url)
            .json(&SendMessage {
                chat_id: target,
                text: payload,
            })
            .send()
            .await
            // The URL embeds the bot token; keep it out of error messages.
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        interpret_response(status, &body)
    }
}

fn send_message_url(api_url: &str, bot_token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), bot_token)
}

/// Map a Bot API reply to a delivery outcome.
fn interpret_response(status: u16, body: &str) -> Result<(), DeliveryError> {
    let parsed: Option<TelegramResponse> = serde_json::from_str(body).ok();

    match parsed {
        Some(reply) if reply.ok && (200..300).contains(&status) => Ok(()),
        Some(reply) => Err(DeliveryError::Rejected {
            status: reply.error_code.unwrap_or(status),
            description: reply
                .description
                .unwrap_or_else(|| "no description".to_string()),
        }),
        None => Err(DeliveryError::Rejected {
            status,
            description: format!("unexpected response body: {}", truncate(body, 200)),
        }),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
