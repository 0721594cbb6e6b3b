//! Retry policy: attempt budget and exponential backoff.
//!
//! The delay before retry *k+1* is `base * 2^(k-1)` after the *k*-th failed
//! retry. The schedule is per-notification; one failing notification never
//! delays another.

use std::time::Duration;

use lineboom_common::config::AppConfig;

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default backoff base (5 seconds).
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(5_000);

/// Exponent is clamped so the multiplier stays representable.
const MAX_EXPONENT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_backoff_ms),
        )
    }

    /// Delay to wait after `attempts` failed retries.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(MAX_EXPONENT);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }

    /// Whether a notification with `attempts` failed retries must be abandoned.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_BACKOFF)
    }
}
