//! Session Query Handlers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::orchestrator::BookGenerationOrchestrator;
use crate::application::queries::{GetSession, GetStatistics, ListSessions};
use crate::domain::blueprint::BlueprintId;
use crate::domain::generation::GenerationStatistics;
use crate::domain::session::{GenerationSession, SessionId, SessionStatus};

// ============================================================================
// Response DTOs
// ============================================================================

/// 会话列表项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub blueprint_id: BlueprintId,
    pub book_title: String,
    pub status: SessionStatus,
    pub first_chapter: u32,
    pub last_chapter: u32,
    /// 范围内已定稿或跳过的章节数
    pub finished_chapters: usize,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&GenerationSession> for SessionSummary {
    fn from(session: &GenerationSession) -> Self {
        let range = session.chapter_range();
        let finished_chapters = session
            .chapters()
            .iter()
            .filter(|c| range.contains(&c.number) && c.status.unblocks_next())
            .count();
        Self {
            id: *session.id(),
            blueprint_id: *session.blueprint_id(),
            book_title: session.book_title().to_string(),
            status: session.status(),
            first_chapter: *range.start(),
            last_chapter: *range.end(),
            finished_chapters,
            last_error: session.last_error().map(str::to_string),
            created_at: session.created_at(),
            last_activity: session.last_activity(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GetSession Handler
pub struct GetSessionHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl GetSessionHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, query: GetSession) -> Result<GenerationSession, ApplicationError> {
        self.orchestrator.get_session(&query.session_id).await
    }
}

/// GetStatistics Handler
pub struct GetStatisticsHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl GetStatisticsHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(
        &self,
        query: GetStatistics,
    ) -> Result<GenerationStatistics, ApplicationError> {
        self.orchestrator.get_statistics(&query.session_id).await
    }
}

/// ListSessions Handler
pub struct ListSessionsHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl ListSessionsHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, _query: ListSessions) -> Result<Vec<SessionSummary>, ApplicationError> {
        let sessions = self.orchestrator.list_sessions().await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }
}
