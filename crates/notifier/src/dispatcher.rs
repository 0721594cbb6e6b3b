//! Front door for outbound notifications.
//!
//! `submit` tries the channel once. A failure is never reported to the caller:
//! the notification is persisted to the durable queue and the retry worker
//! takes over from there.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use lineboom_common::error::AppError;
use lineboom_common::types::{NotificationKind, QueuedNotification, SubmitOutcome};

use crate::channel::{DeliveryChannel, deliver_with_timeout};
use crate::store::QueueStore;
use crate::templates;

pub struct Dispatcher {
    store: Arc<QueueStore>,
    channel: Arc<dyn DeliveryChannel>,
    delivery_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<QueueStore>,
        channel: Arc<dyn DeliveryChannel>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            channel,
            delivery_timeout,
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Deliver `payload` to `target` now, or queue it for retry.
    ///
    /// Errors only on invalid input or when the queue file cannot be written.
    pub async fn submit(&self, target: &str, payload: &str) -> Result<SubmitOutcome, AppError> {
        if target.trim().is_empty() {
            return Err(AppError::Validation("target must not be empty".to_string()));
        }
        if payload.trim().is_empty() {
            return Err(AppError::Validation("payload must not be empty".to_string()));
        }

        match deliver_with_timeout(
            self.channel.as_ref(),
            target,
            payload,
            self.delivery_timeout,
        )
        .await
        {
            Ok(()) => {
                tracing::debug!(recipient = %target, "Notification delivered");
                Ok(SubmitOutcome::Delivered)
            }
            Err(e) => {
                let mut record = QueuedNotification::new(target, payload, Utc::now());
                record.last_error = Some(e.to_string());
                let id = record.id;

                self.store.append(record).await?;

                tracing::warn!(
                    notification_id = %id,
                    recipient = %target,
                    error = %e,
                    "Immediate delivery failed, notification queued for retry"
                );
                Ok(SubmitOutcome::Queued { id })
            }
        }
    }

    /// Render a typed application notification and submit it.
    pub async fn notify(
        &self,
        target: &str,
        kind: &NotificationKind,
    ) -> Result<SubmitOutcome, AppError> {
        let payload = templates::render(kind);
        let outcome = self.submit(target, &payload).await?;
        tracing::info!(recipient = %target, kind = %kind, outcome = %outcome, "Notification submitted");
        Ok(outcome)
    }
}
