//! Chapter Command Handlers - 重新生成 / 审批 / 修订

use std::sync::Arc;

use super::generation_handlers::enqueue_run;
use crate::application::commands::{ApproveChapter, RegenerateChapter, ReviseChapter};
use crate::application::error::ApplicationError;
use crate::application::orchestrator::BookGenerationOrchestrator;
use crate::application::ports::GenerationQueuePort;
use crate::domain::generation::GeneratedChapter;
use crate::domain::session::GenerationSession;

/// RegenerateChapter Handler
pub struct RegenerateChapterHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl RegenerateChapterHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, cmd: RegenerateChapter) -> Result<GeneratedChapter, ApplicationError> {
        self.orchestrator
            .regenerate_chapter(&cmd.session_id, cmd.chapter, cmd.options)
            .await
    }
}

/// ApproveChapter Handler - 审批后继续章节循环
pub struct ApproveChapterHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
    queue: Arc<dyn GenerationQueuePort>,
}

impl ApproveChapterHandler {
    pub fn new(
        orchestrator: Arc<BookGenerationOrchestrator>,
        queue: Arc<dyn GenerationQueuePort>,
    ) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    pub async fn handle(&self, cmd: ApproveChapter) -> Result<GenerationSession, ApplicationError> {
        let session = self
            .orchestrator
            .approve_chapter(&cmd.session_id, cmd.chapter)
            .await?;
        enqueue_run(&self.orchestrator, self.queue.as_ref(), &session).await?;
        Ok(session)
    }
}

/// ReviseChapter Handler
pub struct ReviseChapterHandler {
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl ReviseChapterHandler {
    pub fn new(orchestrator: Arc<BookGenerationOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle(&self, cmd: ReviseChapter) -> Result<GeneratedChapter, ApplicationError> {
        self.orchestrator
            .request_revision(&cmd.session_id, cmd.chapter, cmd.instructions)
            .await
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
    async fn test_approve_requeues_next_chapter() {
        let orchestrator = test_support::orchestrator(Arc::new(FakeLlmClient::with_defaults()));
        let (queue, mut rx) = ChannelGenerationQueue::channel(4);
        let GenerationStart::Started(session) = orchestrator
            .start_generation(
                test_support::blueprint(2),
                GenerationOptions {
                    require_approval: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
        else {
            panic!("expected a started session");
        };
        let session_id = *session.id();
        orchestrator.run_session(&session_id).await.unwrap();

        let handler = ApproveChapterHandler::new(orchestrator.clone(), Arc::new(queue));
        let session = handler
            .handle(ApproveChapter {
                session_id,
                chapter: 1,
            })
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::GeneratingChapter(2));
        assert_eq!(rx.try_recv().unwrap(), session_id);

        let regenerated = RegenerateChapterHandler::new(orchestrator)
            .handle(RegenerateChapter {
                session_id,
                chapter: 1,
                options: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(regenerated.number, 1);
    }
}
