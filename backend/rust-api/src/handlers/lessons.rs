use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::models::{CheckLessonAnswerRequest, CreateLessonRequest, StartLessonRequest};
use crate::services::{
    lesson_service::LessonService, session_service::SessionService, AppState,
};

pub async fn start_lesson(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StartLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        "Starting lesson {} for user {}",
        req.lesson_id,
        req.user_id
    );

    let response = SessionService::new(&state).start_lesson(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn check_answer(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CheckLessonAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!(
        "Checking answer {} to question {} in session {}",
        req.answer_id,
        req.question_id,
        req.session_id
    );

    let response = SessionService::new(&state).check_answer(req).await?;
    Ok(Json(response))
}

pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let result = SessionService::new(&state).get_result(&session_id).await?;
    Ok(Json(result))
}

pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = LessonService::new(&state).create_lesson(req).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

pub async fn list_lessons(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let lessons = LessonService::new(&state).list_lessons().await?;
    Ok(Json(lessons))
}

pub async fn actual_lesson(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = LessonService::new(&state).actual_lesson(user_id).await?;
    Ok(Json(lesson))
}
