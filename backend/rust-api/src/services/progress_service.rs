//! Scoring and the exactly-once commit of a completed session.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::AppError;
use crate::metrics::{LESSONS_COMPLETED_TOTAL, LESSON_SESSIONS_TOTAL, XP_AWARDED_TOTAL};
use crate::models::{LessonResult, LessonSession, NewProgress, UserStatsUpdate};
use crate::services::AppState;
use crate::store::{keys, DurableTx};
use crate::utils::time::{days_between, resolve_timezone};

/// `min(100, round(100 * (total - incorrect) / total))`. Zero questions score zero.
pub fn success_percent(total: usize, incorrect: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let answered_right = total.saturating_sub(incorrect) as f64;
    let percent = (100.0 * answered_right / total as f64).round();
    percent.clamp(0.0, 100.0) as u32
}

/// Flat XP thresholds.
pub fn xp_for(success_percent: u32) -> u32 {
    match success_percent {
        100.. => 200,
        80..=99 => 100,
        50..=79 => 50,
        _ => 10,
    }
}

/// Next streak value for a completion at `now`.
///
/// First completion starts at 1, a completion on the local day after the
/// previous one extends the streak, anything later resets it to 1. A second
/// completion on the same local day is a conflict.
pub fn advance_streak(
    current: u32,
    last_lesson_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<u32, AppError> {
    let Some(last) = last_lesson_date else {
        return Ok(1);
    };

    match days_between(last, now, tz) {
        d if d <= 0 => Err(AppError::Conflict(
            "User has already completed a lesson today".to_string(),
        )),
        1 => Ok(current.saturating_add(1)),
        _ => Ok(1),
    }
}

pub struct ProgressService<'a> {
    state: &'a AppState,
}

impl<'a> ProgressService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Finalizes a completed session: scores it, writes progress and user
    /// stats in one unit of work, publishes the result and drops the session.
    pub async fn complete(&self, session_id: &str) -> Result<LessonResult, AppError> {
        let cache = self.state.cache.as_ref();
        let session_key = keys::session(session_id);

        let raw = cache
            .get(&session_key)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found or expired".to_string()))?;
        let session: LessonSession = serde_json::from_str(&raw).map_err(|e| {
            tracing::warn!("Corrupt session {}: {}", session_id, e);
            AppError::Validation("Invalid session data".to_string())
        })?;

        if !session.is_complete() {
            return Err(AppError::Validation("Lesson not completed".to_string()));
        }

        let success = success_percent(
            session.total_questions(),
            session.answered_incorrectly.len(),
        );
        let result = LessonResult {
            xp_earned: xp_for(success),
            success_percent: success,
        };
        let now = self.state.clock.now();

        let mut tx = self.state.durable.begin().await?;
        match self.apply(tx.as_mut(), &session, result, now).await {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        "Rollback failed for session {}: {}",
                        session_id,
                        rollback_err
                    );
                }
                tracing::warn!("Progress commit for session {} aborted: {}", session_id, e);
                return Err(e);
            }
        }

        let payload = serde_json::to_string(&result)
            .map_err(|e| AppError::Internal(format!("Failed to serialize result: {}", e)))?;
        cache
            .set(
                &keys::lesson_result(session_id),
                &payload,
                self.state.config.lessons.result_ttl(),
            )
            .await?;
        cache.delete(&session_key).await?;
        cache.delete(&keys::user(session.user_id)).await?;

        LESSONS_COMPLETED_TOTAL.inc();
        XP_AWARDED_TOTAL.inc_by(u64::from(result.xp_earned));
        LESSON_SESSIONS_TOTAL.with_label_values(&["completed"]).inc();

        tracing::info!(
            "Lesson {} completed by user {}: {}% success, {} xp",
            session.lesson_id,
            session.user_id,
            result.success_percent,
            result.xp_earned
        );
        Ok(result)
    }

    async fn apply(
        &self,
        tx: &mut dyn DurableTx,
        session: &LessonSession,
        result: LessonResult,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let user = tx
            .get_user(session.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", session.user_id)))?;

        let tz = resolve_timezone(&user.timezone);
        let streak = advance_streak(user.streak, user.last_lesson_date, now, tz)?;

        tx.insert_progress(NewProgress {
            user_id: user.id,
            lesson_id: session.lesson_id,
            xp_earned: result.xp_earned,
            success_percent: result.success_percent,
            completed_at: now,
        })
        .await?;

        tx.update_user_xp_and_streak(
            user.id,
            UserStatsUpdate {
                xp_delta: result.xp_earned,
                streak,
                last_lesson_date: now,
            },
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    #[test]
    fn xp_thresholds() {
        assert_eq!(xp_for(100), 200);
        assert_eq!(xp_for(80), 100);
        assert_eq!(xp_for(79), 50);
        assert_eq!(xp_for(50), 50);
        assert_eq!(xp_for(49), 10);
        assert_eq!(xp_for(0), 10);
    }

    #[test]
    fn four_of_five_is_eighty_percent() {
        assert_eq!(success_percent(5, 1), 80);
        assert_eq!(xp_for(success_percent(5, 1)), 100);
    }

    #[test]
    fn success_percent_rounds_and_caps() {
        assert_eq!(success_percent(3, 1), 67);
        assert_eq!(success_percent(3, 0), 100);
        assert_eq!(success_percent(3, 5), 0);
        assert_eq!(success_percent(0, 0), 0);
    }

    #[test]
    fn streak_transitions() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();

        assert_eq!(advance_streak(0, None, now, Tz::UTC).unwrap(), 1);
        assert_eq!(
            advance_streak(3, Some(now - Duration::days(1)), now, Tz::UTC).unwrap(),
            4
        );
        assert_eq!(
            advance_streak(3, Some(now - Duration::days(2)), now, Tz::UTC).unwrap(),
            1
        );
        assert!(matches!(
            advance_streak(3, Some(now - Duration::hours(2)), now, Tz::UTC),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn streak_days_follow_user_timezone() {
        // 20:00 UTC on the 9th is already the 10th in Tokyo, so 12:00 UTC on
        // the 10th is the same local day there.
        let last = Utc.with_ymd_and_hms(2025, 6, 9, 20, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();

        assert_eq!(advance_streak(2, Some(last), now, Tz::UTC).unwrap(), 3);
        assert!(advance_streak(2, Some(last), now, Tz::Asia__Tokyo).is_err());
    }

    proptest! {
        #[test]
        fn xp_never_decreases_with_score(a in 0u32..=100, b in 0u32..=100) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(xp_for(lo) <= xp_for(hi));
        }

        #[test]
        fn more_misses_never_score_higher(total in 1usize..50, misses in 0usize..60) {
            let score = success_percent(total, misses);
            prop_assert!(score <= 100);
            prop_assert!(success_percent(total, misses + 1) <= score);
        }
    }
}
