//! SQLite Session Repository
//!
//! 会话以 JSON 快照整体保存（章节记录与运行历史都是普通数据）

use async_trait::async_trait;
use sqlx::FromRow;

use super::DbPool;
use crate::application::ports::{RepositoryError, SessionRepositoryPort};
use crate::domain::blueprint::BlueprintId;
use crate::domain::session::{GenerationSession, SessionId};

/// SQLite Session Repository
pub struct SqliteSessionRepository {
    pool: DbPool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SessionRow {
    data: String,
}

impl TryFrom<SessionRow> for GenerationSession {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_str(&row.data)?)
    }
}

fn db_error(err: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(err.to_string())
}

#[async_trait]
impl SessionRepositoryPort for SqliteSessionRepository {
    async fn save(&self, session: &GenerationSession) -> Result<(), RepositoryError> {
        let data = serde_json::to_string(session)?;
        sqlx::query(
            r#"
            INSERT INTO generation_sessions (id, blueprint_id, status, data, created_at, last_activity)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                data = excluded.data,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.blueprint_id().to_string())
        .bind(session.status().as_str())
        .bind(data)
        .bind(session.created_at().timestamp_micros())
        .bind(session.last_activity().timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<GenerationSession>, RepositoryError> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT data FROM generation_sessions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        row.map(GenerationSession::try_from).transpose()
    }

    async fn find_all(&self) -> Result<Vec<GenerationSession>, RepositoryError> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT data FROM generation_sessions ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

        rows.into_iter().map(GenerationSession::try_from).collect()
    }

    async fn find_latest_for_blueprint(
        &self,
        blueprint_id: &BlueprintId,
        exclude: &SessionId,
    ) -> Result<Option<GenerationSession>, RepositoryError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT data FROM generation_sessions
            WHERE blueprint_id = ? AND id != ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(blueprint_id.to_string())
        .bind(exclude.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(GenerationSession::try_from).transpose()
    }
}
