//! Generation Worker - 后台章节循环执行器
//!
//! 从队列消费会话 ID，在信号量限制的并发度内执行 run_session

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::application::orchestrator::BookGenerationOrchestrator;
use crate::domain::session::SessionId;

/// Worker 配置
#[derive(Debug, Clone)]
pub struct GenerationWorkerConfig {
    /// 同时运行的会话数上限
    pub max_concurrent: usize,
}

impl Default for GenerationWorkerConfig {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}

/// 生成 Worker
pub struct GenerationWorker {
    config: GenerationWorkerConfig,
    queue_receiver: mpsc::Receiver<SessionId>,
    orchestrator: Arc<BookGenerationOrchestrator>,
}

impl GenerationWorker {
    pub fn new(
        config: GenerationWorkerConfig,
        queue_receiver: mpsc::Receiver<SessionId>,
        orchestrator: Arc<BookGenerationOrchestrator>,
    ) -> Self {
        Self {
            config,
            queue_receiver,
            orchestrator,
        }
    }

    /// 启动 Worker，队列关闭后等待运行中的会话结束再返回
    pub async fn run(mut self) {
        let max_concurrent = self.config.max_concurrent.max(1);
        tracing::info!(max_concurrent, "GenerationWorker started");

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut running = tokio::task::JoinSet::new();

        while let Some(session_id) = self.queue_receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to acquire semaphore permit");
                    continue;
                }
            };

            let orchestrator = self.orchestrator.clone();
            running.spawn(async move {
                let _permit = permit;
                Self::process(&orchestrator, &session_id).await;
            });

            // 回收已结束的任务
            while running.try_join_next().is_some() {}
        }

        while running.join_next().await.is_some() {}
        tracing::info!("GenerationWorker stopped");
    }

    async fn process(orchestrator: &BookGenerationOrchestrator, session_id: &SessionId) {
        match orchestrator.run_session(session_id).await {
            Ok(session) => {
                tracing::debug!(
                    session_id = %session_id,
                    status = %session.status(),
                    "Session run finished"
                );
            }
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "Session run failed");
            }
        }
    }
}
