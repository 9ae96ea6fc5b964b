#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use codelingo_api::{
    config::Config,
    create_router,
    models::{Answer, Language, Lesson, Question, User},
    services::AppState,
    store::memory::{MemoryCache, MemoryStore},
    utils::time::Clock,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub cache: MemoryCache,
    pub clock: Clock,
}

/// Wednesday morning, UTC.
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 14, 9, 0, 0).unwrap()
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let clock = Clock::manual(start_instant());
    let store = MemoryStore::new(clock.clone());
    let cache = MemoryCache::new(clock.clone());

    let state = Arc::new(AppState::with_stores(
        Config::default(),
        Arc::new(store.clone()),
        Arc::new(cache.clone()),
        clock.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        cache,
        clock,
    }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn seed_language(&self, id: i64, name: &str) -> Language {
        let language = Language {
            id,
            name: name.to_string(),
            description: format!("{} track", name),
            picture: String::new(),
            level: 0,
            popularity: 5,
        };
        self.store.insert_language(language.clone()).await;
        language
    }

    /// Lesson `id` with `questions` questions. Question ids are `id * 100 + n`,
    /// answer ids `question_id * 10 + k`, and answer `k = 1` is the correct one.
    pub async fn seed_lesson(&self, id: i64, questions: usize) -> Lesson {
        let questions = (1..=questions as i64)
            .map(|n| {
                let question_id = id * 100 + n;
                Question {
                    id: question_id,
                    lesson_id: id,
                    text: format!("Question {} of lesson {}", n, id),
                    answers: (0..4)
                        .map(|k| Answer {
                            id: question_id * 10 + k,
                            text: format!("Answer {}", k),
                            is_correct: k == 1,
                        })
                        .collect(),
                }
            })
            .collect();

        let lesson = Lesson {
            id,
            title: format!("Lesson {}", id),
            description: format!("Description of lesson {}", id),
            language_id: 1,
            questions,
        };
        self.store.insert_lesson(lesson.clone()).await;
        lesson
    }

    pub async fn seed_user(
        &self,
        id: i64,
        streak: u32,
        last_lesson_date: Option<DateTime<Utc>>,
        timezone: &str,
    ) -> User {
        let user = User {
            id,
            first_name: format!("User {}", id),
            username: Some(format!("user{}", id)),
            xp: 0,
            streak,
            last_lesson_date,
            timezone: timezone.to_string(),
            active_language_id: None,
            created_at: start_instant(),
        };
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn start(&self, user_id: i64, lesson_id: i64) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/api/lessons/start",
            Some(serde_json::json!({ "user_id": user_id, "lesson_id": lesson_id })),
        )
        .await
    }

    pub async fn check(
        &self,
        session_id: &str,
        question_id: i64,
        answer_id: i64,
    ) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/api/lessons/check",
            Some(serde_json::json!({
                "session_id": session_id,
                "question_id": question_id,
                "answer_id": answer_id,
            })),
        )
        .await
    }

    /// Answers every question of `lesson` correctly, in order.
    pub async fn answer_all_correctly(&self, session_id: &str, lesson: &Lesson) {
        for question in &lesson.questions {
            let (status, body) = self
                .check(session_id, question.id, correct_answer(question))
                .await;
            assert_eq!(status, StatusCode::OK, "unexpected body {}", body);
        }
    }
}

pub fn correct_answer(question: &Question) -> i64 {
    question.id * 10 + 1
}

pub fn wrong_answer(question: &Question) -> i64 {
    question.id * 10 + 2
}
