use validator::Validate;

use crate::error::AppError;
use crate::models::{CreateQuestionRequest, CreateQuestionResponse};
use crate::services::lesson_cache::LessonCache;
use crate::services::AppState;

pub struct QuestionService<'a> {
    state: &'a AppState,
}

impl<'a> QuestionService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Adds a question to a lesson and invalidates the lesson's cached content.
    pub async fn create_question(
        &self,
        req: CreateQuestionRequest,
    ) -> Result<CreateQuestionResponse, AppError> {
        req.validate()?;

        let correct = req.answers.iter().filter(|a| a.is_correct).count();
        if correct != 1 {
            return Err(AppError::Validation(format!(
                "Exactly one correct answer required, got {}",
                correct
            )));
        }

        if self
            .state
            .durable
            .get_lesson_with_questions(req.lesson_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "Lesson with ID {} not found",
                req.lesson_id
            )));
        }

        let question = self
            .state
            .durable
            .create_question(req.lesson_id, &req.text, &req.answers)
            .await?;

        LessonCache::new(self.state)
            .invalidate(req.lesson_id)
            .await?;

        tracing::info!(
            "Question {} added to lesson {}",
            question.id,
            question.lesson_id
        );
        Ok(CreateQuestionResponse::from(&question))
    }
}
