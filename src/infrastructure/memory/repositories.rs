//! In-Memory Repositories
//!
//! 不落盘的会话与蓝图仓储，用于测试和无数据库的轻量运行

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::application::ports::{BlueprintRepositoryPort, RepositoryError, SessionRepositoryPort};
use crate::domain::blueprint::{BlueprintId, BookBlueprint};
use crate::domain::session::{GenerationSession, SessionId};

/// 内存会话仓储
pub struct InMemorySessionRepository {
    sessions: DashMap<SessionId, GenerationSession>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepositoryPort for InMemorySessionRepository {
    async fn save(&self, session: &GenerationSession) -> Result<(), RepositoryError> {
        self.sessions.insert(*session.id(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<GenerationSession>, RepositoryError> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<GenerationSession>, RepositoryError> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(sessions)
    }

    async fn find_latest_for_blueprint(
        &self,
        blueprint_id: &BlueprintId,
        exclude: &SessionId,
    ) -> Result<Option<GenerationSession>, RepositoryError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.blueprint_id() == blueprint_id && s.id() != exclude)
            .max_by_key(|s| s.created_at())
            .map(|s| s.value().clone()))
    }
}

/// 内存蓝图仓储
pub struct InMemoryBlueprintRepository {
    blueprints: DashMap<BlueprintId, BookBlueprint>,
}

impl InMemoryBlueprintRepository {
    pub fn new() -> Self {
        Self {
            blueprints: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemoryBlueprintRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlueprintRepositoryPort for InMemoryBlueprintRepository {
    async fn save(&self, blueprint: &BookBlueprint) -> Result<(), RepositoryError> {
        self.blueprints.insert(blueprint.id, blueprint.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &BlueprintId) -> Result<Option<BookBlueprint>, RepositoryError> {
        Ok(self.blueprints.get(id).map(|b| b.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<BookBlueprint>, RepositoryError> {
        let mut blueprints: Vec<_> = self.blueprints.iter().map(|b| b.value().clone()).collect();
        blueprints.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(blueprints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::ChapterBlueprint;
    use crate::domain::session::GenerationOptions;

    #[tokio::test]
    async fn test_latest_for_blueprint_excludes_current() {
        let repo = InMemorySessionRepository::new();
        let blueprint = BookBlueprint::new("Book", vec![ChapterBlueprint::new(1, "One")]);

        let first = GenerationSession::new(&blueprint, GenerationOptions::default()).unwrap();
        repo.save(&first).await.unwrap();
        let second = GenerationSession::new(&blueprint, GenerationOptions::default()).unwrap();
        repo.save(&second).await.unwrap();

        let found = repo
            .find_latest_for_blueprint(&blueprint.id, second.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), first.id());

        let other = BlueprintId::new();
        assert!(repo
            .find_latest_for_blueprint(&other, second.id())
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blueprint_upsert() {
        let repo = InMemoryBlueprintRepository::new();
        let mut blueprint = BookBlueprint::new("Book", vec![ChapterBlueprint::new(1, "One")]);
        repo.save(&blueprint).await.unwrap();
        blueprint.title = "Renamed".to_string();
        repo.save(&blueprint).await.unwrap();

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Renamed");
        assert_eq!(
            repo.find_by_id(&blueprint.id).await.unwrap().unwrap().title,
            "Renamed"
        );
    }
}
