//! Repository Ports - 出站端口
//!
//! 定义数据持久化的抽象接口
//! 具体实现在 infrastructure 层（SQLite / 内存）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::blueprint::{BlueprintId, BookBlueprint};
use crate::domain::session::{GenerationSession, SessionId};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

// ============================================================================
// Blueprint Repository
// ============================================================================

/// Blueprint Repository Port
#[async_trait]
pub trait BlueprintRepositoryPort: Send + Sync {
    /// 保存蓝图（存在则覆盖）
    async fn save(&self, blueprint: &BookBlueprint) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &BlueprintId) -> Result<Option<BookBlueprint>, RepositoryError>;

    /// 按更新时间倒序
    async fn find_all(&self) -> Result<Vec<BookBlueprint>, RepositoryError>;
}

// ============================================================================
// Session Repository
// ============================================================================

/// Session Repository Port
///
/// 会话以完整快照形式保存
#[async_trait]
pub trait SessionRepositoryPort: Send + Sync {
    /// 保存会话快照（存在则覆盖）
    async fn save(&self, session: &GenerationSession) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<GenerationSession>, RepositoryError>;

    /// 按创建时间倒序
    async fn find_all(&self) -> Result<Vec<GenerationSession>, RepositoryError>;

    /// 同一蓝图最近一次的其他会话
    async fn find_latest_for_blueprint(
        &self,
        blueprint_id: &BlueprintId,
        exclude: &SessionId,
    ) -> Result<Option<GenerationSession>, RepositoryError>;
}
