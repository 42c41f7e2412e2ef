//! SQLite Blueprint Repository

use async_trait::async_trait;
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{BlueprintRepositoryPort, RepositoryError};
use crate::domain::blueprint::{BlueprintId, BookBlueprint};

/// SQLite Blueprint Repository
pub struct SqliteBlueprintRepository {
    pool: DbPool,
}

impl SqliteBlueprintRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct BlueprintRow {
    data: String,
}

impl TryFrom<BlueprintRow> for BookBlueprint {
    type Error = RepositoryError;

    fn try_from(row: BlueprintRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_str(&row.data)?)
    }
}

#[async_trait]
impl BlueprintRepositoryPort for SqliteBlueprintRepository {
    async fn save(&self, blueprint: &BookBlueprint) -> Result<(), RepositoryError> {
        let data = serde_json::to_string(blueprint)?;
        sqlx::query(
            r#"
            INSERT INTO blueprints (id, title, data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(blueprint.id.to_string())
        .bind(blueprint.title.as_str())
        .bind(data)
        .bind(blueprint.updated_at.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &BlueprintId) -> Result<Option<BookBlueprint>, RepositoryError> {
        let row: Option<BlueprintRow> = sqlx::query_as("SELECT data FROM blueprints WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(BookBlueprint::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<BookBlueprint>, RepositoryError> {
        let rows: Vec<BlueprintRow> =
            sqlx::query_as("SELECT data FROM blueprints ORDER BY updated_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(BookBlueprint::try_from).collect()
    }
}
