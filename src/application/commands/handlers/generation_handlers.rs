//! Generation Command Handlers
//!
//! 全书生成只在这里创建会话并提交到后台队列；章节循环由 worker 执行

use std::sync::Arc;

use crate::application::commands::{GenerateChapter, StartGeneration};
use crate::application::error::ApplicationError;
use crate::application::orchestrator::{BookGenerationOrchestrator, GenerationStart};
use crate::application::ports::GenerationQueuePort;
use crate::domain::generation::GeneratedChapter;
use crate::domain::session::{GenerationSession, SessionStatus};

/// 会话处于可执行状态时提交到后台队列
///
/// 提交失败时暂停会话，之后可以通过 resume 重新提交
pub(super) async fn enqueue_run(
    orchestrator: &BookGenerationOrchestrator,
    queue: &dyn GenerationQueuePort,
    session: &GenerationSession,
) -> Result<(), ApplicationError> {
    if !matches!(
        session.status(),
        SessionStatus::Planning | SessionStatus::GeneratingChapter(_)
    ) {
        return Ok(());
    }
    match queue.enqueue(*session.id()) {
        Ok(()) => {
            tracing::debug!(session_id = %session.id(), "Session queued");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(
                session_id = %session.id(),
                error = %err,
                "Failed to queue session, pausing"
            );
            orchestrator.pause(session.id()).await?;
            Err(err.into())
        }
    }
}

// ============================================================================
// StartGeneration
// ============================================================================

/// StartGeneration Handler - 创建会话（或试运行）并提交章节循环
pub struct StartGenerationHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
    queue: Arc<dyn GenerationQueuePort>,
}

impl StartGenerationHandler {
    pub fn new(
        orchestrator: Arc<BookGenerationOrchestrator>,
        queue: Arc<dyn GenerationQueuePort>,
    ) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    pub async fn handle(&self, cmd: StartGeneration) -> Result<GenerationStart, ApplicationError> {
        let start = self
            .orchestrator
            .start_generation(cmd.blueprint, cmd.options)
            .await?;
        if let GenerationStart::Started(session) = &start {
            enqueue_run(&self.orchestrator, self.queue.as_ref(), session).await?;
        }
        Ok(start)
    }
}

// ============================================================================
// GenerateChapter
// ============================================================================

/// GenerateChapter Handler - 同步生成单章
pub struct GenerateChapterHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl GenerateChapterHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, cmd: GenerateChapter) -> Result<GeneratedChapter, ApplicationError> {
        self.orchestrator
            .generate_single_chapter(&cmd.session_id, cmd.chapter)
            .await
    }
}
