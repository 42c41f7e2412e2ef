//! Progress Reporter - 流水线进度观察者

use std::sync::Arc;

use crate::application::pipeline::PipelineObserver;
use crate::application::ports::{
    ChapterGenerationProgress, PipelineProgress, ProgressEvent, ProgressPublisherPort,
};
use crate::domain::session::{RunKind, SessionId};

/// 把单章流水线进度包装为章节进度事件
pub struct ProgressReporter {
    publisher: Arc<dyn ProgressPublisherPort>,
    session_id: SessionId,
    chapter: u32,
    run: RunKind,
}

impl ProgressReporter {
    pub fn new(
        publisher: Arc<dyn ProgressPublisherPort>,
        session_id: SessionId,
        chapter: u32,
        run: RunKind,
    ) -> Self {
        Self {
            publisher,
            session_id,
            chapter,
            run,
        }
    }
}

impl PipelineObserver for ProgressReporter {
    fn on_progress(&self, progress: PipelineProgress) {
        self.publisher.publish(
            &self.session_id,
            ProgressEvent::Chapter(ChapterGenerationProgress {
                session_id: self.session_id,
                chapter: self.chapter,
                run: self.run,
                pipeline: progress,
            }),
        );
    }
}
