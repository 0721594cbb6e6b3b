use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AppError;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path of the durable notification queue (JSONL)
    pub queue_path: PathBuf,

    /// Optional JSONL file receiving permanently failed notifications
    pub dead_letter_path: Option<PathBuf>,

    /// Retry cycle interval in milliseconds (default: 30000)
    pub retry_interval_ms: u64,

    /// Base delay for exponential backoff in milliseconds (default: 5000)
    pub base_backoff_ms: u64,

    /// Maximum delivery attempts before a notification is abandoned (default: 6)
    pub max_attempts: u32,

    /// Upper bound on a single delivery attempt in milliseconds (default: 10000)
    pub delivery_timeout_ms: u64,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Telegram Bot API base URL
    pub telegram_api_url: String,

    /// Chat that receives operational messages from the notifier (startup notice)
    pub telegram_admin_chat_id: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            queue_path: lookup("NOTIFY_QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/notification_queue.jsonl")),
            dead_letter_path: lookup("NOTIFY_DEAD_LETTER_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            retry_interval_ms: parse_or(&lookup, "NOTIFY_RETRY_INTERVAL_MS", 30_000)?,
            base_backoff_ms: parse_or(&lookup, "NOTIFY_BASE_BACKOFF_MS", 5_000)?,
            max_attempts: parse_or(&lookup, "NOTIFY_MAX_ATTEMPTS", 6)?,
            delivery_timeout_ms: parse_or(&lookup, "NOTIFY_DELIVERY_TIMEOUT_MS", 10_000)?,
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()),
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            telegram_admin_chat_id: lookup("TELEGRAM_ADMIN_CHAT_ID")
                .filter(|c| !c.trim().is_empty()),
        };

        if config.retry_interval_ms == 0 {
            return Err(AppError::Config(
                "NOTIFY_RETRY_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if config.max_attempts == 0 {
            return Err(AppError::Config(
                "NOTIFY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if config.delivery_timeout_ms == 0 {
            return Err(AppError::Config(
                "NOTIFY_DELIVERY_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| {
                AppError::Config(format!(
                    "{} must be a valid {}",
                    key,
                    std::any::type_name::<T>()
                ))
            }),
        None => Ok(default),
    }
}
