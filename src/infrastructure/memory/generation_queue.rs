//! Channel Generation Queue
//!
//! 基于 mpsc 通道的后台生成队列，接收端由 GenerationWorker 消费

use tokio::sync::mpsc;

use crate::application::ports::{GenerationQueuePort, QueueError};
use crate::domain::session::SessionId;

pub struct ChannelGenerationQueue {
    sender: mpsc::Sender<SessionId>,
}

impl ChannelGenerationQueue {
    pub fn new(sender: mpsc::Sender<SessionId>) -> Self {
        Self { sender }
    }

    /// 创建队列及其接收端
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionId>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl GenerationQueuePort for ChannelGenerationQueue {
    fn enqueue(&self, session_id: SessionId) -> Result<(), QueueError> {
        self.sender.try_send(session_id).map_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Failed to enqueue session");
            match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }
        })?;
        tracing::debug!(session_id = %session_id, "Session enqueued for generation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue() {
        let (queue, mut rx) = ChannelGenerationQueue::channel(1);
        let id = SessionId::new();

        queue.enqueue(id).unwrap();
        assert!(matches!(queue.enqueue(SessionId::new()), Err(QueueError::Full)));
        assert_eq!(rx.recv().await, Some(id));

        drop(rx);
        assert!(matches!(queue.enqueue(id), Err(QueueError::Closed)));
    }
}
