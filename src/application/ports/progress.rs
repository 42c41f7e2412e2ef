//! Progress Port - 进度事件推送
//!
//! 进度通过每个会话一个 broadcast 通道推送；发送永不阻塞生成，
//! 慢订阅者会收到 Lagged 并继续。

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::session::{ChapterStatus, RunKind, SessionId, SessionStatus};

/// 单章流水线进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub step_index: usize,
    pub step_count: usize,
    pub step: String,
    /// 修订轮次
    pub iteration: u32,
    pub overall_percent: f32,
    pub step_percent: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_text: Option<String>,
    pub word_count: usize,
}

/// 章节级进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterGenerationProgress {
    pub session_id: SessionId,
    pub chapter: u32,
    pub run: RunKind,
    pub pipeline: PipelineProgress,
}

/// 全书级进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub current_chapter: Option<u32>,
    pub finished_chapters: usize,
    pub total_chapters: usize,
    pub percent: f32,
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// 会话状态变更
    Generation(GenerationProgress),
    /// 章节开始
    ChapterStarted {
        session_id: SessionId,
        chapter: u32,
        title: String,
        run: RunKind,
    },
    /// 流水线步骤进度（含流式文本）
    Chapter(ChapterGenerationProgress),
    /// 章节结束
    ChapterFinished {
        session_id: SessionId,
        chapter: u32,
        status: ChapterStatus,
        word_count: usize,
        requires_manual_review: bool,
    },
    /// 章节失败
    ChapterFailed {
        session_id: SessionId,
        chapter: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        error: String,
    },
}

/// Progress Publisher Port
pub trait ProgressPublisherPort: Send + Sync {
    /// 推送事件（没有订阅者时丢弃）
    fn publish(&self, session_id: &SessionId, event: ProgressEvent);

    /// 订阅会话事件
    fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<ProgressEvent>;

    /// 关闭会话通道，订阅者的流随之结束
    fn close(&self, session_id: &SessionId);
}
