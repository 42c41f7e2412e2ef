//! Session Command Handlers - 暂停 / 恢复 / 取消

use std::sync::Arc;

use super::generation_handlers::enqueue_run;
use crate::application::commands::{CancelSession, PauseSession, ResumeSession};
use crate::application::error::ApplicationError;
use crate::application::orchestrator::BookGenerationOrchestrator;
use crate::application::ports::GenerationQueuePort;
use crate::domain::session::GenerationSession;

/// PauseSession Handler
pub struct PauseSessionHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl PauseSessionHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, cmd: PauseSession) -> Result<GenerationSession, ApplicationError> {
        self.orchestrator.pause(&cmd.session_id).await
    }
}

/// ResumeSession Handler - 恢复后重新提交章节循环
pub struct ResumeSessionHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
    queue: Arc<dyn GenerationQueuePort>,
}

impl ResumeSessionHandler {
    pub fn new(
        orchestrator: Arc<BookGenerationOrchestrator>,
        queue: Arc<dyn GenerationQueuePort>,
    ) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    pub async fn handle(&self, cmd: ResumeSession) -> Result<GenerationSession, ApplicationError> {
        let session = self.orchestrator.resume(&cmd.session_id).await?;
        enqueue_run(&self.orchestrator, self.queue.as_ref(), &session).await?;
        Ok(session)
    }
}

/// CancelSession Handler
pub struct CancelSessionHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl CancelSessionHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, cmd: CancelSession) -> Result<GenerationSession, ApplicationError> {
        self.orchestrator.cancel(&cmd.session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::orchestrator::GenerationStart;
    use crate::application::test_support;
    use crate::domain::session::{GenerationOptions, SessionStatus};
    use crate::infrastructure::adapters::FakeLlmClient;
    use crate::infrastructure::memory::ChannelGenerationQueue;

    #[tokio::test]
    async fn test_pause_resume_cancel() {
        let orchestrator = test_support::orchestrator(Arc::new(FakeLlmClient::with_defaults()));
        let (queue, mut rx) = ChannelGenerationQueue::channel(4);
        let queue: Arc<dyn GenerationQueuePort> = Arc::new(queue);

        let GenerationStart::Started(session) = orchestrator
            .start_generation(test_support::blueprint(2), GenerationOptions::default())
            .await
            .unwrap()
        else {
            panic!("expected a started session");
        };
        let session_id = *session.id();

        let paused = PauseSessionHandler::new(orchestrator.clone())
            .handle(PauseSession { session_id })
            .await
            .unwrap();
        assert_eq!(paused.status(), SessionStatus::Paused);

        let resumed = ResumeSessionHandler::new(orchestrator.clone(), queue)
            .handle(ResumeSession { session_id })
            .await
            .unwrap();
        assert_eq!(resumed.status(), SessionStatus::GeneratingChapter(1));
        assert_eq!(rx.try_recv().unwrap(), session_id);

        let cancelled = CancelSessionHandler::new(orchestrator)
            .handle(CancelSession { session_id })
            .await
            .unwrap();
        assert_eq!(cancelled.status(), SessionStatus::Cancelled);
    }
}
