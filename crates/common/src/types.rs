use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A notification waiting in the durable queue for another delivery attempt.
///
/// Serialized as one camelCase JSON object per line of the queue file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedNotification {
    pub id: Uuid,
    /// Recipient reference (Telegram chat id)
    pub target: String,
    /// Message body
    pub payload: String,
    /// Retry attempts made so far (the initial attempt in `submit` is not counted)
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Earliest time the retry worker may try again
    pub next_retry_at: DateTime<Utc>,
    /// Reason of the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedNotification {
    /// Create a fresh record, eligible for the next retry cycle.
    pub fn new(target: impl Into<String>, payload: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            payload: payload.into(),
            attempts: 0,
            created_at: now,
            next_retry_at: now,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }
}

/// A notification removed from the queue after exhausting its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    #[serde(flatten)]
    pub notification: QueuedNotification,
    pub abandoned_at: DateTime<Utc>,
}

/// Result of submitting a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered on the first attempt; nothing was persisted.
    Delivered,
    /// First attempt failed; the notification is in the durable queue.
    Queued { id: Uuid },
}

impl SubmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered)
    }
}

impl std::fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitOutcome::Delivered => write!(f, "delivered"),
            SubmitOutcome::Queued { id } => write!(f, "queued ({})", id),
        }
    }
}

/// Application messages relayed to users through the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// Upcoming match the user has not bet on yet.
    MatchReminder {
        home: String,
        away: String,
        kickoff: DateTime<Utc>,
    },
    /// A prediction was accepted.
    BetConfirmed {
        home: String,
        away: String,
        prediction: String,
    },
    /// Final score of a match the user predicted.
    MatchResult {
        home: String,
        away: String,
        home_score: u32,
        away_score: u32,
    },
    /// One-time code for logging in through the bot.
    LoginCode { code: String },
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::MatchReminder { .. } => write!(f, "match_reminder"),
            NotificationKind::BetConfirmed { .. } => write!(f, "bet_confirmed"),
            NotificationKind::MatchResult { .. } => write!(f, "match_result"),
            NotificationKind::LoginCode { .. } => write!(f, "login_code"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_queued_notification_wire_format() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap();
        let record = QueuedNotification::new("user1", "Match starting", now);
        let line = serde_json::to_string(&record).unwrap();

        assert!(line.contains("\"target\":\"user1\""));
        assert!(line.contains("\"attempts\":0"));
        assert!(line.contains("\"createdAt\":\"2026-05-01T18:00:00Z\""));
        assert!(line.contains("\"nextRetryAt\":\"2026-05-01T18:00:00Z\""));
        assert!(!line.contains("lastError"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_queued_notification_accepts_minimal_record() {
        let line = r#"{"id":"6f1f2c3e-7a8b-4c1d-9e0f-112233445566","target":"42","payload":"hi","attempts":2,"createdAt":"2026-05-01T18:00:00Z","nextRetryAt":"2026-05-01T18:00:10+00:00"}"#;
        let record: QueuedNotification = serde_json::from_str(line).unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.target, "42");
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_is_due() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap();
        let mut record = QueuedNotification::new("user1", "hi", now);
        assert!(record.is_due(now));
        record.next_retry_at = now + chrono::Duration::seconds(5);
        assert!(!record.is_due(now));
        assert!(record.is_due(now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_dead_letter_flattens_record() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap();
        let dead = DeadLetter {
            notification: QueuedNotification::new("user2", "Reminder", now),
            abandoned_at: now,
        };
        let value = serde_json::to_value(&dead).unwrap();
        assert_eq!(value["target"], "user2");
        assert_eq!(value["abandonedAt"], "2026-05-01T18:00:00Z");
    }

    #[test]
    fn test_submit_outcome_display() {
        assert_eq!(SubmitOutcome::Delivered.to_string(), "delivered");
        assert!(SubmitOutcome::Delivered.is_delivered());
        let id = Uuid::new_v4();
        assert!(!SubmitOutcome::Queued { id }.is_delivered());
    }
}
