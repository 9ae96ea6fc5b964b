use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::extractors::AppJson;
use crate::models::{AuthUserRequest, LanguageUpdateRequest};
use crate::services::{user_service::UserService, AppState};

pub async fn auth_user(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<AuthUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!("Authenticating user {}", req.user_id);

    let response = UserService::new(&state).auth(req).await?;
    Ok(Json(response))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = UserService::new(&state).profile(user_id).await?;
    Ok(Json(user))
}

pub async fn change_language(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    AppJson(req): AppJson<LanguageUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = UserService::new(&state)
        .change_language(user_id, req)
        .await?;
    Ok(Json(response))
}
