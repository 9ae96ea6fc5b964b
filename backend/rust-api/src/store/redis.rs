//! Redis-backed cache store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{CacheStore, StoreError};
use crate::metrics::track_cache_operation;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Swaps the value only if the key still holds the expected revision.
const COMPARE_AND_SET_SCRIPT: &str = r#"
    local current = redis.call('GET', KEYS[1])

    if current == ARGV[1] then
        redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
        return 1
    end

    return 0
"#;

fn map_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_timeout() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

/// Redis rejects `EX 0`, so sub-second TTLs round up to one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
    retry: RetryConfig,
}

impl RedisCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            retry: RetryConfig::default(),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        track_cache_operation(
            "get",
            retry_async_with_config(self.retry.clone(), || {
                let mut conn = self.redis.clone();
                async move {
                    redis::cmd("GET")
                        .arg(key)
                        .query_async::<Option<String>>(&mut conn)
                        .await
                }
            }),
        )
        .await
        .map_err(map_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let seconds = ttl_seconds(ttl);
        track_cache_operation(
            "setex",
            retry_async_with_config(self.retry.clone(), || {
                let mut conn = self.redis.clone();
                async move {
                    redis::cmd("SETEX")
                        .arg(key)
                        .arg(seconds)
                        .arg(value)
                        .query_async::<()>(&mut conn)
                        .await
                }
            }),
        )
        .await
        .map_err(map_error)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        track_cache_operation(
            "del",
            retry_async_with_config(self.retry.clone(), || {
                let mut conn = self.redis.clone();
                async move {
                    redis::cmd("DEL")
                        .arg(key)
                        .query_async::<()>(&mut conn)
                        .await
                }
            }),
        )
        .await
        .map_err(map_error)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        // Not retried: a lost reply after a successful swap must surface as an error.
        let mut conn = self.redis.clone();
        let swapped: i32 = track_cache_operation(
            "compare_and_set",
            redis::Script::new(COMPARE_AND_SET_SCRIPT)
                .key(key)
                .arg(expected)
                .arg(value)
                .arg(ttl_seconds(ttl))
                .invoke_async(&mut conn),
        )
        .await
        .map_err(map_error)?;

        Ok(swapped == 1)
    }
}
