use chrono::{DateTime, Utc};
use validator::Validate;

use crate::error::AppError;
use crate::metrics::{record_cache_hit, record_cache_miss};
use crate::models::{
    ActiveLanguage, AuthUserRequest, LanguageUpdateRequest, LanguageUpdateResponse, NewUser, User,
    UserAuthResponse, UserProfile,
};
use crate::services::AppState;
use crate::store::{keys, StoreError};
use crate::utils::time::{days_between, resolve_timezone, DEFAULT_TIMEZONE};

pub struct UserService<'a> {
    state: &'a AppState,
}

impl<'a> UserService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Returns the existing profile or registers a new user.
    pub async fn auth(&self, req: AuthUserRequest) -> Result<UserAuthResponse, AppError> {
        req.validate()?;

        match self.profile(req.user_id).await {
            Ok(user) => return Ok(UserAuthResponse { user }),
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let timezone = req
            .timezone
            .as_deref()
            .map(resolve_timezone)
            .unwrap_or(DEFAULT_TIMEZONE);

        let created = self
            .state
            .durable
            .create_user(NewUser {
                id: req.user_id,
                first_name: req.first_name,
                username: req.username,
                timezone: timezone.name().to_string(),
            })
            .await;

        let user = match created {
            Ok(user) => {
                tracing::info!("New user registered: {}", user.id);
                user
            }
            Err(StoreError::Conflict(_)) => {
                // Registered concurrently by another request.
                return Ok(UserAuthResponse {
                    user: self.profile(req.user_id).await?,
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(UserAuthResponse {
            user: self.build_profile(&user, false).await?,
        })
    }

    /// Profile from cache, or from the durable store with streak
    /// bookkeeping applied and the result cached.
    pub async fn profile(&self, user_id: i64) -> Result<UserProfile, AppError> {
        let key = keys::user(user_id);

        if let Some(raw) = self.state.cache.get(&key).await? {
            match serde_json::from_str::<UserProfile>(&raw) {
                Ok(profile) => {
                    record_cache_hit();
                    tracing::debug!("User {} found in cache", user_id);
                    return Ok(profile);
                }
                Err(e) => tracing::warn!("Discarding corrupt cache entry {}: {}", key, e),
            }
        }
        record_cache_miss();

        let mut user = self
            .state
            .durable
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with ID {} not found", user_id)))?;

        let is_streak = self.refresh_streak(&mut user).await?;
        let profile = self.build_profile(&user, is_streak).await?;

        let payload = serde_json::to_string(&profile)
            .map_err(|e| AppError::Internal(format!("Failed to serialize profile: {}", e)))?;
        self.state
            .cache
            .set(&key, &payload, self.state.config.lessons.user_cache_ttl())
            .await?;

        Ok(profile)
    }

    pub async fn change_language(
        &self,
        user_id: i64,
        req: LanguageUpdateRequest,
    ) -> Result<LanguageUpdateResponse, AppError> {
        let language = self
            .state
            .durable
            .get_language(req.language_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Language with ID {} not found", req.language_id))
            })?;

        if self.state.durable.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "User with ID {} not found",
                user_id
            )));
        }

        self.state
            .durable
            .set_active_language(user_id, language.id)
            .await?;
        self.state.cache.delete(&keys::user(user_id)).await?;

        tracing::info!("Active language for user {} set to {}", user_id, language.name);
        Ok(LanguageUpdateResponse { success: true })
    }

    /// True when the user already completed a lesson today. Resets a broken
    /// streak durably and drops the cached profile.
    async fn refresh_streak(&self, user: &mut User) -> Result<bool, AppError> {
        let Some(last) = user.last_lesson_date else {
            return Ok(false);
        };

        let days = days_since(last, self.state.clock.now(), &user.timezone);
        if days > 1 && user.streak > 0 {
            tracing::debug!(
                "Streak broken for user {}: last lesson {} days ago",
                user.id,
                days
            );
            self.state.durable.reset_streak(user.id).await?;
            self.state.cache.delete(&keys::user(user.id)).await?;
            user.streak = 0;
            return Ok(false);
        }

        Ok(days == 0)
    }

    async fn build_profile(&self, user: &User, is_streak: bool) -> Result<UserProfile, AppError> {
        let active_language = match user.active_language_id {
            Some(id) => self
                .state
                .durable
                .get_language(id)
                .await?
                .map(|language| ActiveLanguage {
                    language_id: language.id,
                    name: language.name,
                }),
            None => None,
        };

        Ok(UserProfile {
            user_id: user.id,
            first_name: user.first_name.clone(),
            username: user.username.clone(),
            streak: user.streak,
            xp: user.xp,
            active_language,
            timezone: user.timezone.clone(),
            is_streak,
        })
    }
}

fn days_since(last: DateTime<Utc>, now: DateTime<Utc>, timezone: &str) -> i64 {
    days_between(last, now, resolve_timezone(timezone))
}
