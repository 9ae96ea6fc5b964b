use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Learner profile. `id` is the Telegram user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    /// Telegram handle, when the profile has one.
    #[serde(default)]
    pub username: Option<String>,
    pub xp: i64,
    pub streak: u32,
    pub last_lesson_date: Option<DateTime<Utc>>,
    pub timezone: String,
    pub active_language_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub timezone: String,
}

/// Durable record of one completed session. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub id: String,
    pub user_id: i64,
    pub lesson_id: i64,
    pub xp_earned: u32,
    pub success_percent: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProgress {
    pub user_id: i64,
    pub lesson_id: i64,
    pub xp_earned: u32,
    pub success_percent: u32,
    pub completed_at: DateTime<Utc>,
}

/// Stat changes applied together with the progress insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStatsUpdate {
    pub xp_delta: u32,
    pub streak: u32,
    pub last_lesson_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLanguage {
    pub language_id: i64,
    pub name: String,
}

/// Client-facing profile, cached under `user:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub streak: u32,
    pub xp: i64,
    pub active_language: Option<ActiveLanguage>,
    pub timezone: String,
    /// A lesson was already completed today in the user's timezone.
    pub is_streak: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AuthUserRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub username: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAuthResponse {
    pub user: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageUpdateRequest {
    pub language_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageUpdateResponse {
    pub success: bool,
}
