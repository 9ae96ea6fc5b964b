//! Lesson-session lifecycle: start, answer, result.
//!
//! Sessions live in the cache under `session:{lesson_id}-{user_id}`. Every
//! answer is a read-modify-write guarded by compare-and-set on the raw
//! record, so concurrent submissions to one session are never lost. The
//! writer whose update completes the session flips it to `Completed` and
//! hands it to the committer.

use crate::error::AppError;
use crate::metrics::{ANSWERS_SUBMITTED_TOTAL, LESSON_SESSIONS_TOTAL};
use crate::models::{
    CheckLessonAnswerRequest, CheckLessonAnswerResponse, LessonResult, LessonSession,
    SessionStatus, StartLessonRequest, StartLessonResponse,
};
use crate::services::lesson_cache::LessonCache;
use crate::services::progress_service::ProgressService;
use crate::services::AppState;
use crate::store::keys;

pub struct SessionService<'a> {
    state: &'a AppState,
}

impl<'a> SessionService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Opens (or restarts) the user's attempt at a lesson.
    pub async fn start_lesson(
        &self,
        req: StartLessonRequest,
    ) -> Result<StartLessonResponse, AppError> {
        let entry = LessonCache::new(self.state)
            .get_or_load(req.lesson_id)
            .await?;

        if entry.questions.is_empty() {
            return Err(AppError::Validation(format!(
                "Lesson {} has no questions",
                req.lesson_id
            )));
        }

        let session = LessonSession::new(
            req.user_id,
            req.lesson_id,
            self.state.clock.now(),
            entry.correct_answers.clone(),
        );
        let payload = serde_json::to_string(&session)
            .map_err(|e| AppError::Internal(format!("Failed to serialize session: {}", e)))?;

        // Unconditional: a restart replaces any open attempt for this pair.
        self.state
            .cache
            .set(
                &keys::session(&session.session_id),
                &payload,
                self.state.config.lessons.session_ttl(),
            )
            .await?;

        LESSON_SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        tracing::info!(
            "Session {} started: user {} lesson {} ({} questions)",
            session.session_id,
            req.user_id,
            req.lesson_id,
            session.total_questions()
        );

        Ok(entry.start_response(&session.session_id))
    }

    /// Checks one answer and records it in the session.
    pub async fn check_answer(
        &self,
        req: CheckLessonAnswerRequest,
    ) -> Result<CheckLessonAnswerResponse, AppError> {
        let settings = &self.state.config.lessons;
        let key = keys::session(&req.session_id);

        for attempt in 1..=settings.answer_write_attempts {
            let raw = self
                .state
                .cache
                .get(&key)
                .await?
                .ok_or_else(|| AppError::NotFound("Session not found or expired".to_string()))?;
            let mut session: LessonSession = serde_json::from_str(&raw).map_err(|e| {
                tracing::warn!("Corrupt session {}: {}", req.session_id, e);
                AppError::Validation("Invalid session data".to_string())
            })?;

            if session.is_time_expired(self.state.clock.now(), settings.session_time_limit()) {
                self.state.cache.delete(&key).await?;
                LESSON_SESSIONS_TOTAL.with_label_values(&["expired"]).inc();
                tracing::info!("Session {} expired", req.session_id);
                return Err(AppError::Expired("Lesson time has expired".to_string()));
            }

            if session.status == SessionStatus::Completed {
                // A previous commit attempt did not finish; retry it.
                let is_correct = session.evaluate(req.question_id, req.answer_id);
                ProgressService::new(self.state)
                    .complete(&req.session_id)
                    .await?;
                return Ok(CheckLessonAnswerResponse {
                    question_id: req.question_id,
                    is_correct,
                });
            }

            let outcome = session.record_answer(req.question_id, req.answer_id);
            if session.is_complete() {
                session.status = SessionStatus::Completed;
            }
            session.version += 1;

            let next = serde_json::to_string(&session)
                .map_err(|e| AppError::Internal(format!("Failed to serialize session: {}", e)))?;
            let swapped = self
                .state
                .cache
                .compare_and_set(&key, &raw, &next, settings.session_ttl())
                .await?;
            if !swapped {
                tracing::debug!(
                    "Session {} changed concurrently, retrying (attempt {})",
                    req.session_id,
                    attempt
                );
                tokio::task::yield_now().await;
                continue;
            }

            ANSWERS_SUBMITTED_TOTAL
                .with_label_values(&[if outcome.is_correct { "true" } else { "false" }])
                .inc();
            tracing::debug!(
                "Session {}: question {} answered {}, recorded: {}",
                req.session_id,
                req.question_id,
                if outcome.is_correct { "correctly" } else { "incorrectly" },
                outcome.recorded
            );

            if session.status == SessionStatus::Completed {
                ProgressService::new(self.state)
                    .complete(&req.session_id)
                    .await?;
            }

            return Ok(CheckLessonAnswerResponse {
                question_id: req.question_id,
                is_correct: outcome.is_correct,
            });
        }

        tracing::warn!(
            "Giving up on session {} after {} contended writes",
            req.session_id,
            settings.answer_write_attempts
        );
        Err(AppError::Conflict(
            "Session is being updated concurrently, please retry".to_string(),
        ))
    }

    /// Result of a committed session. Not consumed by reading.
    pub async fn get_result(&self, session_id: &str) -> Result<LessonResult, AppError> {
        let raw = self
            .state
            .cache
            .get(&keys::lesson_result(session_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Lesson result not found or expired".to_string()))?;

        serde_json::from_str(&raw).map_err(|e| {
            tracing::warn!("Corrupt lesson result {}: {}", session_id, e);
            AppError::Validation("Invalid lesson result data".to_string())
        })
    }
}
