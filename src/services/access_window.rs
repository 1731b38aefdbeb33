//! Time-bounded access windows. Classification is pure; `now` is always an
//! argument so the evaluator never reads the clock itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::services::EngineError;

pub const EXPIRING_SOON_DAYS: i64 = 7;

const DAY_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Active,
    ExpiringSoon {
        #[serde(rename = "daysRemaining")]
        days_remaining: i64,
    },
    Expired,
}

impl AccessStatus {
    pub fn is_expired(&self) -> bool {
        matches!(self, AccessStatus::Expired)
    }

    pub fn days_remaining(&self) -> Option<i64> {
        match self {
            AccessStatus::ExpiringSoon { days_remaining } => Some(*days_remaining),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessWindow {
    pub id: String,
    pub learner_id: String,
    pub scope_id: String,
    pub started_at: String,
    pub expires_at: Option<String>,
}

/// `daysRemaining = ceil((expiresAt - now) / 1 day)`; expired at zero or
/// below. No expiry means the window never closes.
pub fn evaluate(
    now: DateTime<Utc>,
    _started_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> AccessStatus {
    let Some(expires_at) = expires_at else {
        return AccessStatus::Active;
    };

    let remaining_secs = (expires_at - now).num_seconds();
    let days_remaining = div_ceil(remaining_secs, DAY_SECONDS);

    if days_remaining <= 0 {
        AccessStatus::Expired
    } else if days_remaining <= EXPIRING_SOON_DAYS {
        AccessStatus::ExpiringSoon { days_remaining }
    } else {
        AccessStatus::Active
    }
}

/// An expired window locks lessons that are not yet complete.
pub fn lesson_locked_for_new_progress(status: AccessStatus, completed: bool) -> bool {
    status.is_expired() && !completed
}

/// Completed lessons stay reachable for review even after expiry.
pub fn lesson_reachable_for_review(status: AccessStatus, completed: bool) -> bool {
    completed || !status.is_expired()
}

pub async fn get_access_window(
    pool: &SqlitePool,
    learner_id: &str,
    scope_id: &str,
) -> Result<AccessWindow, EngineError> {
    let row = sqlx::query(
        r#"SELECT "id", "learnerId", "scopeId", "startedAt", "expiresAt"
           FROM "access_windows" WHERE "learnerId" = ? AND "scopeId" = ?"#,
    )
    .bind(learner_id)
    .bind(scope_id)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or_else(|| EngineError::NotFound("access window".to_string()))?;
    Ok(AccessWindow {
        id: row.try_get("id").unwrap_or_default(),
        learner_id: row.try_get("learnerId").unwrap_or_default(),
        scope_id: row.try_get("scopeId").unwrap_or_default(),
        started_at: row.try_get("startedAt").unwrap_or_default(),
        expires_at: row.try_get::<Option<String>, _>("expiresAt").ok().flatten(),
    })
}

pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn div_ceil(n: i64, d: i64) -> i64 {
    if n > 0 && n % d != 0 {
        n / d + 1
    } else {
        n / d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn no_expiry_is_always_active() {
        let status = evaluate(at(2024, 1, 9), at(2024, 1, 1), None);
        assert_eq!(status, AccessStatus::Active);
    }

    #[test]
    fn expired_the_day_after_the_window_closes() {
        let status = evaluate(at(2024, 1, 9), at(2024, 1, 1), Some(at(2024, 1, 8)));
        assert_eq!(status, AccessStatus::Expired);
    }

    #[test]
    fn expiring_soon_counts_whole_days_up() {
        // 6 days and one hour remaining rounds up to 7.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let status = evaluate(now, at(2024, 1, 1), Some(at(2024, 1, 8)));
        assert_eq!(status, AccessStatus::ExpiringSoon { days_remaining: 7 });
    }

    #[test]
    fn exactly_at_expiry_is_expired() {
        let status = evaluate(at(2024, 1, 8), at(2024, 1, 1), Some(at(2024, 1, 8)));
        assert_eq!(status, AccessStatus::Expired);
    }

    #[test]
    fn far_expiry_is_active() {
        let status = evaluate(at(2024, 1, 1), at(2024, 1, 1), Some(at(2024, 3, 1)));
        assert_eq!(status, AccessStatus::Active);
    }

    #[test]
    fn expired_locks_incomplete_but_keeps_review() {
        let status = AccessStatus::Expired;
        assert!(lesson_locked_for_new_progress(status, false));
        assert!(!lesson_locked_for_new_progress(status, true));
        assert!(lesson_reachable_for_review(status, true));
        assert!(!lesson_reachable_for_review(status, false));
    }

    #[test]
    fn active_window_locks_nothing() {
        let status = AccessStatus::Active;
        assert!(!lesson_locked_for_new_progress(status, false));
        assert!(lesson_reachable_for_review(status, false));
    }
}
