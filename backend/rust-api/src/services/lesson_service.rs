use validator::Validate;

use crate::error::AppError;
use crate::models::{ActualLessonResponse, CreateLessonRequest, LessonSummary};
use crate::services::user_service::UserService;
use crate::services::AppState;
use crate::store::NewLesson;

pub struct LessonService<'a> {
    state: &'a AppState,
}

impl<'a> LessonService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn create_lesson(&self, req: CreateLessonRequest) -> Result<LessonSummary, AppError> {
        req.validate()?;

        if self
            .state
            .durable
            .get_language(req.language_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "Language with ID {} not found",
                req.language_id
            )));
        }

        let lesson = self
            .state
            .durable
            .create_lesson(NewLesson {
                title: req.title,
                description: req.description,
                language_id: req.language_id,
            })
            .await?;

        tracing::info!("Lesson {} created: {}", lesson.id, lesson.title);
        Ok(LessonSummary::from(&lesson))
    }

    pub async fn list_lessons(&self) -> Result<Vec<LessonSummary>, AppError> {
        let lessons = self.state.durable.list_lessons().await?;
        Ok(lessons.iter().map(LessonSummary::from).collect())
    }

    /// Next lesson to take. Advisory only: the progress commit is what
    /// rejects a second completion on the same day.
    pub async fn actual_lesson(&self, user_id: i64) -> Result<ActualLessonResponse, AppError> {
        let profile = UserService::new(self.state).profile(user_id).await?;
        if profile.is_streak {
            return Err(AppError::Conflict(
                "User has already completed a lesson today".to_string(),
            ));
        }

        let lesson = self
            .state
            .durable
            .first_unfinished_lesson(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No unfinished lesson found".to_string()))?;

        Ok(ActualLessonResponse {
            lesson_id: lesson.id,
            title: lesson.title,
            description: lesson.description,
        })
    }
}
