use axum::{
    http::{header, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::AppError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/lessons", lesson_routes())
        .nest("/api/questions", question_routes())
        .nest("/api/language", language_routes())
        .nest("/api/user", user_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
}

fn lesson_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(handlers::lessons::start_lesson))
        .route("/check", post(handlers::lessons::check_answer))
        .route("/result/{session_id}", get(handlers::lessons::get_result))
        .route("/add-lesson", post(handlers::lessons::create_lesson))
        .route("/all", get(handlers::lessons::list_lessons))
        .route(
            "/actual-lesson/{user_id}",
            get(handlers::lessons::actual_lesson),
        )
}

fn question_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(handlers::questions::create_question))
}

fn language_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/add-language", post(handlers::languages::create_language))
        .route(
            "/available-languages",
            get(handlers::languages::list_languages),
        )
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth", post(handlers::users::auth_user))
        .route("/{user_id}", get(handlers::users::get_user))
        .route(
            "/{user_id}/change-language",
            patch(handlers::users::change_language),
        )
}
