//! Generation Queue Port - 后台生成任务队列

use thiserror::Error;

use crate::domain::session::SessionId;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Generation queue is full")]
    Full,

    #[error("Generation queue is closed")]
    Closed,
}

/// Generation Queue Port
///
/// 提交的会话由后台 worker 执行章节循环
pub trait GenerationQueuePort: Send + Sync {
    fn enqueue(&self, session_id: SessionId) -> Result<(), QueueError>;
}
