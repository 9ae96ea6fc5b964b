use serde::{Deserialize, Serialize};
use validator::Validate;

/// Programming-language track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub picture: String,
    /// 0 beginner, 1 intermediate, 2 professional.
    pub level: i32,
    /// 0..=10
    pub popularity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLanguageRequest {
    #[validate(length(min = 1, max = 20))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub picture: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 2))]
    pub level: i32,
    #[serde(default)]
    #[validate(range(min = 0, max = 10))]
    pub popularity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageResponse {
    pub id: i64,
    pub name: String,
}

impl From<&Language> for LanguageResponse {
    fn from(language: &Language) -> Self {
        Self {
            id: language.id,
            name: language.name.clone(),
        }
    }
}
