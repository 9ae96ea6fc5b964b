use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Lifetimes and limits of the lesson-session lifecycle, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LessonSettings {
    pub lesson_cache_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub session_time_limit_secs: u64,
    pub result_ttl_secs: u64,
    pub user_cache_ttl_secs: u64,
    /// Read-modify-write attempts per answer before reporting a conflict.
    pub answer_write_attempts: usize,
}

impl Default for LessonSettings {
    fn default() -> Self {
        Self {
            lesson_cache_ttl_secs: 864_000,
            session_ttl_secs: 1800,
            session_time_limit_secs: 1800,
            result_ttl_secs: 1800,
            user_cache_ttl_secs: 3600,
            answer_write_attempts: 8,
        }
    }
}

impl LessonSettings {
    pub fn lesson_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.lesson_cache_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Saturates at the largest representable duration.
    pub fn session_time_limit(&self) -> chrono::Duration {
        i64::try_from(self.session_time_limit_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn user_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.user_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    pub lessons: LessonSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "codelingo".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            lessons: LessonSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml + APP__SECTION__KEY overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| {
                tracing::warn!("MONGO_URI not set, using {}", defaults.mongo_uri);
                defaults.mongo_uri.clone()
            });

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| defaults.mongo_database.clone());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| defaults.bind_addr.clone());

        let lessons = match settings.get::<LessonSettings>("lessons") {
            Ok(lessons) => lessons,
            Err(config::ConfigError::NotFound(_)) => defaults.lessons.clone(),
            Err(e) => return Err(e),
        };

        if lessons.answer_write_attempts == 0 {
            return Err(config::ConfigError::Message(
                "lessons.answer_write_attempts must be positive".to_string(),
            ));
        }

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            bind_addr,
            lessons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_lesson_lifecycle() {
        let lessons = LessonSettings::default();

        assert_eq!(lessons.lesson_cache_ttl(), Duration::from_secs(10 * 24 * 3600));
        assert_eq!(lessons.session_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(lessons.session_time_limit(), chrono::Duration::minutes(30));
        assert_eq!(lessons.result_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(lessons.user_cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn oversized_time_limit_saturates() {
        let lessons = LessonSettings {
            session_time_limit_secs: u64::MAX,
            ..LessonSettings::default()
        };
        assert_eq!(lessons.session_time_limit(), chrono::Duration::MAX);

        let lessons = LessonSettings {
            session_time_limit_secs: 10_000_000_000_000_000,
            ..LessonSettings::default()
        };
        assert_eq!(lessons.session_time_limit(), chrono::Duration::MAX);
    }
}
