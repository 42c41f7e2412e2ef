//! Blueprint Command Handlers

use chrono::Utc;
use std::sync::Arc;

use crate::application::commands::SaveBlueprint;
use crate::application::error::ApplicationError;
use crate::application::ports::BlueprintRepositoryPort;
use crate::domain::blueprint::BookBlueprint;

/// SaveBlueprint Handler - 校验后保存
pub struct SaveBlueprintHandler {
    blueprint_repo: Arc<dyn BlueprintRepositoryPort>,
}

impl SaveBlueprintHandler {
    pub fn new(blueprint_repo: Arc<dyn BlueprintRepositoryPort>) -> Self {
        Self { blueprint_repo }
    }

    pub async fn handle(&self, cmd: SaveBlueprint) -> Result<BookBlueprint, ApplicationError> {
        let mut blueprint = cmd.blueprint;
        blueprint.validate()?;
        blueprint.updated_at = Utc::now();

        self.blueprint_repo.save(&blueprint).await?;

        tracing::info!(
            blueprint_id = %blueprint.id,
            title = %blueprint.title,
            chapters = blueprint.chapter_count(),
            "Blueprint saved"
        );
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support;
    use crate::infrastructure::memory::InMemoryBlueprintRepository;

    #[tokio::test]
    async fn test_save_validates() {
        let repo = InMemoryBlueprintRepository::new().arc();
        let handler = SaveBlueprintHandler::new(repo.clone());

        let saved = handler
            .handle(SaveBlueprint {
                blueprint: test_support::blueprint(2),
            })
            .await
            .unwrap();
        assert_eq!(
            repo.find_by_id(&saved.id).await.unwrap().unwrap().title,
            "Test Book"
        );

        let mut invalid = test_support::blueprint(1);
        invalid.chapters.clear();
        let err = handler
            .handle(SaveBlueprint { blueprint: invalid })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Validation(_)));
    }
}
