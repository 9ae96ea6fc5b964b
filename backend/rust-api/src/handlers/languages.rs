use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::models::CreateLanguageRequest;
use crate::services::{language_service::LanguageService, AppState};

pub async fn create_language(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateLanguageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let language = LanguageService::new(&state).create_language(req).await?;
    Ok((StatusCode::CREATED, Json(language)))
}

pub async fn list_languages(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let languages = LanguageService::new(&state).list_languages().await?;
    Ok(Json(languages))
}
