//! Read-through cache of denormalized lesson content under `lesson:{id}:data`.

use std::time::Duration;

use crate::error::AppError;
use crate::metrics::{record_cache_hit, record_cache_miss};
use crate::models::LessonCacheEntry;
use crate::services::AppState;
use crate::store::{keys, CacheStore, DurableStore};

pub struct LessonCache<'a> {
    durable: &'a dyn DurableStore,
    cache: &'a dyn CacheStore,
    ttl: Duration,
}

impl<'a> LessonCache<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            durable: state.durable.as_ref(),
            cache: state.cache.as_ref(),
            ttl: state.config.lessons.lesson_cache_ttl(),
        }
    }

    /// Returns the cached entry, loading and caching it from the durable
    /// store on a miss. A corrupt entry counts as a miss and is replaced.
    pub async fn get_or_load(&self, lesson_id: i64) -> Result<LessonCacheEntry, AppError> {
        let key = keys::lesson_data(lesson_id);

        if let Some(raw) = self.cache.get(&key).await? {
            match serde_json::from_str::<LessonCacheEntry>(&raw) {
                Ok(entry) => {
                    record_cache_hit();
                    tracing::debug!("Lesson {} served from cache", lesson_id);
                    return Ok(entry);
                }
                Err(e) => {
                    tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                }
            }
        }

        record_cache_miss();
        tracing::debug!("Lesson {} not cached, loading from store", lesson_id);

        let lesson = self
            .durable
            .get_lesson_with_questions(lesson_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

        let entry = LessonCacheEntry::from(&lesson);
        let payload = serde_json::to_string(&entry)
            .map_err(|e| AppError::Internal(format!("Failed to serialize lesson: {}", e)))?;
        self.cache.set(&key, &payload, self.ttl).await?;

        tracing::info!(
            "Cached lesson {} with {} questions",
            lesson_id,
            entry.questions.len()
        );
        Ok(entry)
    }

    /// Drops the cached entry so the next read reloads it.
    pub async fn invalidate(&self, lesson_id: i64) -> Result<(), AppError> {
        self.cache.delete(&keys::lesson_data(lesson_id)).await?;
        Ok(())
    }
}
