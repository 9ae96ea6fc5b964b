use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::models::CreateQuestionRequest;
use crate::services::{question_service::QuestionService, AppState};

pub async fn create_question(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Creating question for lesson {}", req.lesson_id);

    let question = QuestionService::new(&state).create_question(req).await?;
    Ok((StatusCode::CREATED, Json(question)))
}
