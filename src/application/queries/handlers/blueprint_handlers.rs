//! Blueprint Query Handlers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::BlueprintRepositoryPort;
use crate::application::queries::{GetBlueprint, ListBlueprints};
use crate::domain::blueprint::{BlueprintId, BookBlueprint};

/// 蓝图列表项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlueprintSummary {
    pub id: BlueprintId,
    pub title: String,
    pub genre: String,
    pub chapter_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&BookBlueprint> for BlueprintSummary {
    fn from(blueprint: &BookBlueprint) -> Self {
        Self {
            id: blueprint.id,
            title: blueprint.title.clone(),
            genre: blueprint.genre.clone(),
            chapter_count: blueprint.chapter_count(),
            updated_at: blueprint.updated_at,
        }
    }
}

/// GetBlueprint Handler
pub struct GetBlueprintHandler {
    blueprint_repo: Arc<dyn BlueprintRepositoryPort>,
}

impl GetBlueprintHandler {
    pub fn new(blueprint_repo: Arc<dyn BlueprintRepositoryPort>) -> Self {
        Self { blueprint_repo }
    }

    pub async fn handle(&self, query: GetBlueprint) -> Result<BookBlueprint, ApplicationError> {
        self.blueprint_repo
            .find_by_id(&query.blueprint_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Blueprint", query.blueprint_id))
    }
}

/// ListBlueprints Handler
pub struct ListBlueprintsHandler {
    blueprint_repo: Arc<dyn BlueprintRepositoryPort>,
}

impl ListBlueprintsHandler {
    pub fn new(blueprint_repo: Arc<dyn BlueprintRepositoryPort>) -> Self {
        Self { blueprint_repo }
    }

    pub async fn handle(
        &self,
        _query: ListBlueprints,
    ) -> Result<Vec<BlueprintSummary>, ApplicationError> {
        let blueprints = self.blueprint_repo.find_all().await?;
        Ok(blueprints.iter().map(BlueprintSummary::from).collect())
    }
}
