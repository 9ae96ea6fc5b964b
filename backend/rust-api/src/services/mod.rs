use crate::config::Config;
use crate::store::mongo::MongoStore;
use crate::store::redis::RedisCache;
use crate::store::{CacheStore, DurableStore};
use crate::utils::time::Clock;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub durable: Arc<dyn DurableStore>,
    pub cache: Arc<dyn CacheStore>,
    pub clock: Clock,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let durable = MongoStore::new(mongo_client, &config.mongo_database);
        durable.ensure_indexes().await?;

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self::with_stores(
            config,
            Arc::new(durable),
            Arc::new(RedisCache::new(redis)),
            Clock::system(),
        ))
    }

    /// Builds state around already-constructed stores (tests, alternative backends).
    pub fn with_stores(
        config: Config,
        durable: Arc<dyn DurableStore>,
        cache: Arc<dyn CacheStore>,
        clock: Clock,
    ) -> Self {
        Self {
            config,
            durable,
            cache,
            clock,
        }
    }
}

pub mod language_service;
pub mod lesson_cache;
pub mod lesson_service;
pub mod progress_service;
pub mod question_service;
pub mod session_service;
pub mod user_service;
