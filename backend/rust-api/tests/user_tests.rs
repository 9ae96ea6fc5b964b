use axum::http::StatusCode;
use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use codelingo_api::store::CacheStore;
use serde_json::json;

mod common;

use common::{create_test_app, start_instant};

#[tokio::test]
async fn test_auth_creates_then_returns_same_user() {
    let app = create_test_app();

    let body = json!({
        "user_id": 7,
        "first_name": "Ada",
        "username": "ada_l",
        "timezone": "Europe/Berlin"
    });
    let (status, created) = app.send("POST", "/api/user/auth", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["user"]["user_id"], 7);
    assert_eq!(created["user"]["username"], "ada_l");
    assert_eq!(app.store.user(7).await.unwrap().username.as_deref(), Some("ada_l"));
    assert_eq!(created["user"]["timezone"], "Europe/Berlin");
    assert_eq!(created["user"]["streak"], 0);
    assert_eq!(created["user"]["is_streak"], false);

    let (status, again) = app.send("POST", "/api/user/auth", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["user"], created["user"]);
}

#[tokio::test]
async fn test_auth_with_unknown_timezone_falls_back_to_utc() {
    let app = create_test_app();

    let (status, body) = app
        .send(
            "POST",
            "/api/user/auth",
            Some(json!({ "user_id": 8, "first_name": "Linus", "timezone": "Mars/Base" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["timezone"], "UTC");
    assert!(body["user"]["username"].is_null());
}

#[tokio::test]
async fn test_auth_rejects_empty_name() {
    let app = create_test_app();

    let (status, _) = app
        .send(
            "POST",
            "/api/user/auth",
            Some(json!({ "user_id": 9, "first_name": "" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_auth_rejects_overlong_username() {
    let app = create_test_app();

    let (status, body) = app
        .send(
            "POST",
            "/api/user/auth",
            Some(json!({ "user_id": 10, "first_name": "Grace", "username": "g".repeat(51) })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let app = create_test_app();

    let (status, body) = app.send("GET", "/api/user/404", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "User with ID 404 not found");
}

#[tokio::test]
async fn test_profile_is_cached() {
    let app = create_test_app();
    app.seed_user(42, 2, None, "UTC").await;

    let (status, profile) = app.send("GET", "/api/user/42", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["xp"], 0);
    assert_eq!(profile["username"], "user42");
    let ttl = app.cache.ttl("user:42").unwrap();
    assert_eq!(ttl, Duration::hours(1));
}

#[tokio::test]
async fn test_broken_streak_is_reset_on_read() {
    let app = create_test_app();
    app.seed_user(42, 5, Some(start_instant() - Duration::days(3)), "UTC")
        .await;

    let (status, profile) = app.send("GET", "/api/user/42", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["streak"], 0);
    assert_eq!(profile["is_streak"], false);
    assert_eq!(app.store.user(42).await.unwrap().streak, 0);
}

#[tokio::test]
async fn test_change_language_invalidates_profile() {
    let app = create_test_app();
    app.seed_user(42, 0, None, "UTC").await;
    app.seed_language(3, "Haskell").await;
    app.send("GET", "/api/user/42", None).await;
    assert!(app.cache.get("user:42").await.unwrap().is_some());

    let (status, _) = app
        .send(
            "PATCH",
            "/api/user/42/change-language",
            Some(json!({ "language_id": 99 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            "PATCH",
            "/api/user/42/change-language",
            Some(json!({ "language_id": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert!(app.cache.get("user:42").await.unwrap().is_none());

    let (_, profile) = app.send("GET", "/api/user/42", None).await;
    assert_eq!(
        profile["active_language"],
        json!({ "language_id": 3, "name": "Haskell" })
    );
}

#[tokio::test]
async fn test_actual_lesson_progresses_day_by_day() {
    let app = create_test_app();
    let first = app.seed_lesson(1, 2).await;
    app.seed_lesson(2, 2).await;
    app.seed_user(42, 0, None, "UTC").await;

    let (status, actual) = app
        .send("GET", "/api/lessons/actual-lesson/42", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(actual["lesson_id"], 1);

    app.start(42, 1).await;
    app.answer_all_correctly("1-42", &first).await;

    let (status, body) = app
        .send("GET", "/api/lessons/actual-lesson/42", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"]["message"],
        "User has already completed a lesson today"
    );

    app.clock.advance(Duration::days(1));
    app.cache.delete("user:42").await.unwrap();
    let (status, actual) = app
        .send("GET", "/api/lessons/actual-lesson/42", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(actual["lesson_id"], 2);
}

#[tokio::test]
async fn test_actual_lesson_when_everything_is_done() {
    let app = create_test_app();
    app.seed_user(42, 0, None, "UTC").await;

    let (status, body) = app
        .send("GET", "/api/lessons/actual-lesson/42", None)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No unfinished lesson found");
}

#[tokio::test]
async fn test_health_reports_both_stores() {
    let app = create_test_app();

    let (status, body) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["durable_store"]["status"], "healthy");
    assert_eq!(body["dependencies"]["cache"]["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_require_basic_auth() {
    let app = create_test_app();

    let (status, _) = app.send("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());
    let request = axum::http::Request::builder()
        .uri("/metrics")
        .header(
            "authorization",
            format!("Basic {}", general_purpose::STANDARD.encode(expected)),
        )
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
