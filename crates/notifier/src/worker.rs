//! Background retry worker.
//!
//! On a fixed interval, walks the durable queue in log order (oldest first)
//! and retries every notification whose `nextRetryAt` has passed:
//! 1. Success → record removed
//! 2. Failure below the attempt budget → attempts + 1, rescheduled with backoff
//! 3. Failure reaching the budget → record removed and dead-lettered
//!
//! Attempts run one at a time, so a notification never has two deliveries in
//! flight. A failing notification only affects its own schedule; queue-file
//! errors abort the cycle and are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use lineboom_common::config::AppConfig;
use lineboom_common::error::AppError;
use lineboom_common::types::QueuedNotification;

use crate::channel::{DeliveryChannel, deliver_with_timeout};
use crate::dead_letter::DeadLetterLog;
use crate::policy::RetryPolicy;
use crate::store::QueueStore;

/// Default interval between retry cycles (30 seconds).
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default upper bound on a single delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Counters for a single retry cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
    /// Not yet due
    pub deferred: usize,
}

pub struct RetryWorker {
    store: Arc<QueueStore>,
    channel: Arc<dyn DeliveryChannel>,
    policy: RetryPolicy,
    interval: Duration,
    delivery_timeout: Duration,
    dead_letters: Option<DeadLetterLog>,
}

impl RetryWorker {
    pub fn new(
        store: Arc<QueueStore>,
        channel: Arc<dyn DeliveryChannel>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            channel,
            policy,
            interval: DEFAULT_RETRY_INTERVAL,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            dead_letters: None,
        }
    }

    /// Build a worker with interval, timeout, policy and dead-letter file
    /// taken from configuration.
    pub fn from_config(
        store: Arc<QueueStore>,
        channel: Arc<dyn DeliveryChannel>,
        config: &AppConfig,
    ) -> Self {
        let worker = Self::new(store, channel, RetryPolicy::from_config(config))
            .with_interval(Duration::from_millis(config.retry_interval_ms))
            .with_delivery_timeout(Duration::from_millis(config.delivery_timeout_ms));

        match &config.dead_letter_path {
            Some(path) => worker.with_dead_letters(DeadLetterLog::new(path)),
            None => worker,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_dead_letters(mut self, log: DeadLetterLog) -> Self {
        self.dead_letters = Some(log);
        self
    }

    /// Run retry cycles until `shutdown` flips to `true`.
    ///
    /// The first cycle starts immediately so notifications recovered from disk
    /// are retried right after startup. Returns an error only when the queue
    /// file can no longer be read or written.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            max_attempts = self.policy.max_attempts,
            base_backoff_ms = self.policy.base_backoff.as_millis() as u64,
            "Retry worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle(Utc::now(), Some(&shutdown)).await {
                        tracing::error!(error = %e, "Retry cycle failed");
                        return Err(e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        tracing::info!("Retry worker stopped");
        Ok(())
    }

    /// Run one retry cycle against the current wall clock.
    pub async fn run_cycle(&self) -> Result<CycleReport, AppError> {
        self.cycle(Utc::now(), None).await
    }

    /// Run one retry cycle as if the current time were `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, AppError> {
        self.cycle(now, None).await
    }

    async fn cycle(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<CycleReport, AppError> {
        let mut report = CycleReport::default();

        for record in self.store.snapshot().await {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!("Shutdown requested, stopping retry cycle early");
                break;
            }

            // Budget may have been lowered since the record was written.
            if self.policy.is_exhausted(record.attempts) {
                self.abandon(record, now).await?;
                report.abandoned += 1;
                continue;
            }

            if !record.is_due(now) {
                report.deferred += 1;
                continue;
            }

            report.attempted += 1;

            match deliver_with_timeout(
                self.channel.as_ref(),
                &record.target,
                &record.payload,
                self.delivery_timeout,
            )
            .await
            {
                Ok(()) => {
                    self.store.remove(record.id).await?;
                    tracing::info!(
                        notification_id = %record.id,
                        recipient = %record.target,
                        attempts = record.attempts + 1,
                        "Queued notification delivered"
                    );
                    report.delivered += 1;
                }
                Err(e) => {
                    let mut next = record;
                    next.attempts += 1;
                    next.last_error = Some(e.to_string());

                    if self.policy.is_exhausted(next.attempts) {
                        self.abandon(next, now).await?;
                        report.abandoned += 1;
                    } else {
                        // Measured from the later of the cycle clock and the
                        // wall clock, so the delay is never shortened by the
                        // time the attempt itself took.
                        let failed_at = now.max(Utc::now());
                        next.next_retry_at =
                            retry_at(failed_at, self.policy.backoff(next.attempts));

                        tracing::warn!(
                            notification_id = %next.id,
                            recipient = %next.target,
                            attempts = next.attempts,
                            next_retry_at = %next.next_retry_at,
                            error = %e,
                            "Retry failed, rescheduled"
                        );

                        self.store.update(next).await?;
                        report.rescheduled += 1;
                    }
                }
            }
        }

        if report.attempted > 0 || report.abandoned > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                rescheduled = report.rescheduled,
                abandoned = report.abandoned,
                deferred = report.deferred,
                "Retry cycle completed"
            );
        }

        Ok(report)
    }

    /// Drop a notification for good. Queue errors propagate; a dead-letter
    /// write failure is only logged since the record has already left the queue.
    async fn abandon(&self, record: QueuedNotification, now: DateTime<Utc>) -> Result<(), AppError> {
        self.store.remove(record.id).await?;

        tracing::error!(
            notification_id = %record.id,
            recipient = %record.target,
            attempts = record.attempts,
            last_error = record.last_error.as_deref().unwrap_or("none"),
            "Notification abandoned after exhausting retry attempts"
        );

        if let Some(log) = &self.dead_letters {
            let id = record.id;
            if let Err(e) = log.record(record, now).await {
                tracing::error!(
                    notification_id = %id,
                    path = %log.path().display(),
                    error = %e,
                    "Failed to write dead letter"
                );
            }
        }

        Ok(())
    }
}

fn retry_at(from: DateTime<Utc>, backoff: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(backoff)
        .ok()
        .and_then(|delay| from.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
