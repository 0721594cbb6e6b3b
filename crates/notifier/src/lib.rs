//! Durable notification delivery for the LineBoom Telegram bot.
//!
//! - [`dispatcher::Dispatcher`] attempts immediate delivery and queues failures
//! - [`store::QueueStore`] persists pending notifications as JSONL
//! - [`worker::RetryWorker`] retries them with exponential backoff
//! - [`channel::TelegramChannel`] delivers through the Bot API

pub mod channel;
pub mod dead_letter;
pub mod dispatcher;
pub mod policy;
pub mod store;
pub mod templates;
pub mod worker;
