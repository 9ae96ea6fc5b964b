//! Gateways to the two external stores.
//!
//! `DurableStore` is the source of truth (lessons, users, progress).
//! `CacheStore` is a string key-value store with per-key expiry holding
//! JSON-serialized lesson content, live sessions and results.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{
    Language, Lesson, NewAnswer, NewProgress, NewUser, Question, User, UserProgress,
    UserStatsUpdate,
};

pub mod memory;
pub mod mongo;
pub mod redis;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Backend(String),
}

/// Cache key schema.
pub mod keys {
    pub fn lesson_data(lesson_id: i64) -> String {
        format!("lesson:{}:data", lesson_id)
    }

    pub fn session(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    pub fn lesson_result(session_id: &str) -> String {
        format!("lesson_result:{}", session_id)
    }

    pub fn user(user_id: i64) -> String {
        format!("user:{}", user_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub title: String,
    pub description: String,
    pub language_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewLanguage {
    pub name: String,
    pub description: String,
    pub picture: String,
    pub level: i32,
    pub popularity: i32,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Lesson with its questions (ordered by id) and their answers.
    async fn get_lesson_with_questions(&self, lesson_id: i64)
        -> Result<Option<Lesson>, StoreError>;

    /// All lessons without questions.
    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError>;

    async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson, StoreError>;

    /// Lowest-id lesson the user has no progress record for.
    async fn first_unfinished_lesson(&self, user_id: i64) -> Result<Option<Lesson>, StoreError>;

    async fn create_question(
        &self,
        lesson_id: i64,
        text: &str,
        answers: &[NewAnswer],
    ) -> Result<Question, StoreError>;

    async fn list_languages(&self) -> Result<Vec<Language>, StoreError>;

    async fn get_language(&self, language_id: i64) -> Result<Option<Language>, StoreError>;

    /// Fails with `StoreError::Conflict` when the name is taken.
    async fn create_language(&self, language: NewLanguage) -> Result<Language, StoreError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StoreError>;

    /// Fails with `StoreError::Conflict` when the id is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn set_active_language(&self, user_id: i64, language_id: i64) -> Result<(), StoreError>;

    async fn reset_streak(&self, user_id: i64) -> Result<(), StoreError>;

    /// Opens an atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn DurableTx>, StoreError>;
}

/// Unit of work over the durable store. Dropped without `commit` means rolled back.
#[async_trait]
pub trait DurableTx: Send {
    async fn get_user(&mut self, user_id: i64) -> Result<Option<User>, StoreError>;

    async fn insert_progress(&mut self, progress: NewProgress) -> Result<UserProgress, StoreError>;

    async fn update_user_xp_and_streak(
        &mut self,
        user_id: i64,
        update: UserStatsUpdate,
    ) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Replaces `key` with `value` only if it currently holds exactly `expected`.
    /// Returns false when the key is missing or holds something else.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn cache_keys_follow_schema() {
        assert_eq!(keys::lesson_data(3), "lesson:3:data");
        assert_eq!(keys::session("3-9"), "session:3-9");
        assert_eq!(keys::lesson_result("3-9"), "lesson_result:3-9");
        assert_eq!(keys::user(9), "user:9");
    }
}
