//! Progress Publisher Implementation
//!
//! 每个会话一个 broadcast 通道，WebSocket 订阅者从中接收进度事件

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::{ProgressEvent, ProgressPublisherPort};
use crate::domain::session::SessionId;

const DEFAULT_CAPACITY: usize = 256;

/// 进度事件发布器
pub struct ProgressPublisher {
    channels: DashMap<SessionId, broadcast::Sender<ProgressEvent>>,
    capacity: usize,
}

impl ProgressPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 当前打开的通道数
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressPublisherPort for ProgressPublisher {
    fn publish(&self, session_id: &SessionId, event: ProgressEvent) {
        if let Some(sender) = self.channels.get(session_id) {
            if let Err(e) = sender.send(event) {
                tracing::trace!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to publish progress event (no receivers)"
                );
            }
        }
    }

    fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<ProgressEvent> {
        self.channels
            .entry(*session_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    fn close(&self, session_id: &SessionId) {
        if self.channels.remove(session_id).is_some() {
            tracing::debug!(session_id = %session_id, "Progress channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ProgressEvent;

    fn failed(session_id: SessionId, chapter: u32) -> ProgressEvent {
        ProgressEvent::ChapterFailed {
            session_id,
            chapter,
            step: None,
            error: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_close() {
        let publisher = ProgressPublisher::default();
        let id = SessionId::new();

        // 无订阅者时丢弃
        publisher.publish(&id, failed(id, 1));
        assert_eq!(publisher.channel_count(), 0);

        let mut rx = publisher.subscribe(&id);
        publisher.publish(&id, failed(id, 2));
        assert_eq!(rx.recv().await.unwrap(), failed(id, 2));

        publisher.close(&id);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let publisher = ProgressPublisher::new(2);
        let id = SessionId::new();
        let mut rx = publisher.subscribe(&id);

        for chapter in 1..=5 {
            publisher.publish(&id, failed(id, chapter));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap(), failed(id, 4));
    }
}
