//! Service-boundary error taxonomy.
//!
//! Every failure that leaves a service is one of these variants, and every
//! variant maps to a stable `(status, code, message)` triple at the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Lesson, session, result, user or language absent.
    #[error("{0}")]
    NotFound(String),

    /// Session is past its time limit.
    #[error("{0}")]
    Expired(String),

    /// Duplicate same-day completion, duplicate names, concurrent writers.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input or malformed cached state.
    #[error("{0}")]
    Validation(String),

    /// Unexpected store failure. The message is logged, not returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Expired(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Expired(_) => "expired",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            AppError::Internal(ref detail) => {
                tracing::error!("Internal error: {}", detail);
                "An internal error occurred".to_string()
            }
            ref other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_stable_classification() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
            (AppError::Expired("x".into()), StatusCode::FORBIDDEN, "expired"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "conflict"),
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST, "validation_error"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn store_conflict_stays_a_conflict() {
        let err: AppError = StoreError::Conflict("language exists".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = StoreError::Unavailable("redis down".into()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
