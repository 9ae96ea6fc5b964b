use validator::Validate;

use crate::error::AppError;
use crate::models::{CreateLanguageRequest, LanguageResponse};
use crate::services::AppState;
use crate::store::NewLanguage;

pub struct LanguageService<'a> {
    state: &'a AppState,
}

impl<'a> LanguageService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn create_language(
        &self,
        req: CreateLanguageRequest,
    ) -> Result<LanguageResponse, AppError> {
        req.validate()?;

        let language = self
            .state
            .durable
            .create_language(NewLanguage {
                name: req.name,
                description: req.description,
                picture: req.picture,
                level: req.level,
                popularity: req.popularity,
            })
            .await?;

        tracing::info!("Language {} created: {}", language.id, language.name);
        Ok(LanguageResponse::from(&language))
    }

    pub async fn list_languages(&self) -> Result<Vec<LanguageResponse>, AppError> {
        let languages = self.state.durable.list_languages().await?;
        Ok(languages.iter().map(LanguageResponse::from).collect())
    }
}
