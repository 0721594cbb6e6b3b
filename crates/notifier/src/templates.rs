//! Rendering of application notifications into bot message text.

use lineboom_common::types::NotificationKind;

/// Translate a typed notification into the text sent to the user.
pub fn render(kind: &NotificationKind) -> String {
    match kind {
        NotificationKind::MatchReminder {
            home,
            away,
            kickoff,
        } => format!(
            "⚽ Match starting soon: {} vs {} at {} UTC. Don't forget to place your prediction!",
            home,
            away,
            kickoff.format("%d.%m %H:%M")
        ),
        NotificationKind::BetConfirmed {
            home,
            away,
            prediction,
        } => format!(
            "✅ Prediction accepted: {} vs {}: {}",
            home, away, prediction
        ),
        NotificationKind::MatchResult {
            home,
            away,
            home_score,
            away_score,
        } => format!(
            "🏁 Final score: {} {}:{} {}",
            home, home_score, away_score, away
        ),
        NotificationKind::LoginCode { code } => {
            format!("🔐 Your login code: {}. Do not share it with anyone.", code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_render_match_reminder() {
        let text = render(&NotificationKind::MatchReminder {
            home: "Arsenal".to_string(),
            away: "Chelsea".to_string(),
            kickoff: Utc.with_ymd_and_hms(2026, 5, 3, 16, 30, 0).unwrap(),
        });
        assert!(text.contains("Arsenal vs Chelsea"));
        assert!(text.contains("03.05 16:30"));
    }

    #[test]
    fn test_render_bet_confirmed() {
        let text = render(&NotificationKind::BetConfirmed {
            home: "Real Madrid".to_string(),
            away: "Barcelona".to_string(),
            prediction: "2:1".to_string(),
        });
        assert_eq!(text, "✅ Prediction accepted: Real Madrid vs Barcelona: 2:1");
    }

    #[test]
    fn test_render_match_result() {
        let text = render(&NotificationKind::MatchResult {
            home: "Inter".to_string(),
            away: "Milan".to_string(),
            home_score: 0,
            away_score: 3,
        });
        assert_eq!(text, "🏁 Final score: Inter 0:3 Milan");
    }

    #[test]
    fn test_render_login_code() {
        let text = render(&NotificationKind::LoginCode {
            code: "481516".to_string(),
        });
        assert!(text.contains("481516"));
    }
}
