use axum::http::StatusCode;
use codelingo_api::store::CacheStore;
use serde_json::json;

mod common;

use common::create_test_app;

fn question_body(lesson_id: i64, correct: &[bool]) -> serde_json::Value {
    let answers: Vec<_> = correct
        .iter()
        .enumerate()
        .map(|(i, is_correct)| json!({ "text": format!("option {}", i), "is_correct": is_correct }))
        .collect();
    json!({ "text": "What does `?` do?", "answers": answers, "lesson_id": lesson_id })
}

#[tokio::test]
async fn test_create_language_and_list() {
    let app = create_test_app();

    let (status, created) = app
        .send(
            "POST",
            "/api/language/add-language",
            Some(json!({ "name": "Rust", "description": "Systems", "level": 1, "popularity": 9 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Rust");

    let (status, listed) = app
        .send("GET", "/api/language/available-languages", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([{ "id": created["id"], "name": "Rust" }]));
}

#[tokio::test]
async fn test_duplicate_language_conflicts() {
    let app = create_test_app();
    app.seed_language(1, "Go").await;

    let (status, body) = app
        .send("POST", "/api/language/add-language", Some(json!({ "name": "Go" })))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn test_invalid_language_is_rejected() {
    let app = create_test_app();

    let (status, body) = app
        .send(
            "POST",
            "/api/language/add-language",
            Some(json!({ "name": "Rust", "level": 7 })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_add_lesson_requires_known_language() {
    let app = create_test_app();

    let (status, _) = app
        .send(
            "POST",
            "/api/lessons/add-lesson",
            Some(json!({ "title": "Traits", "description": "", "language_id": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.seed_language(5, "Rust").await;
    let (status, lesson) = app
        .send(
            "POST",
            "/api/lessons/add-lesson",
            Some(json!({ "title": "Traits", "description": "Shared behaviour", "language_id": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lesson["title"], "Traits");
    assert_eq!(lesson["language_id"], 5);

    let (status, all) = app.send("GET", "/api/lessons/all", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["lesson_id"], lesson["lesson_id"]);
}

#[tokio::test]
async fn test_question_needs_four_answers_with_one_correct() {
    let app = create_test_app();
    app.seed_lesson(1, 1).await;

    let (status, _) = app
        .send("POST", "/api/questions", Some(question_body(1, &[true, false, false])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            "POST",
            "/api/questions",
            Some(question_body(1, &[true, true, false, false])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = app
        .send(
            "POST",
            "/api/questions",
            Some(question_body(1, &[false, false, false, false])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_question_for_unknown_lesson_is_not_found() {
    let app = create_test_app();

    let (status, _) = app
        .send(
            "POST",
            "/api/questions",
            Some(question_body(404, &[false, true, false, false])),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_new_question_invalidates_lesson_cache() {
    let app = create_test_app();
    app.seed_lesson(1, 2).await;
    app.start(42, 1).await;
    assert!(app.cache.get("lesson:1:data").await.unwrap().is_some());

    let (status, question) = app
        .send(
            "POST",
            "/api/questions",
            Some(question_body(1, &[false, false, true, false])),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(question["answers"].as_array().unwrap().len(), 4);
    assert!(!question.to_string().contains("is_correct"));
    assert!(app.cache.get("lesson:1:data").await.unwrap().is_none());

    let (_, started) = app.start(42, 1).await;
    let questions = started["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[2]["question_id"], question["question_id"]);
}
