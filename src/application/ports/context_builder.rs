//! Context Builder Port - 章节上下文组装

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::blueprint::BookBlueprint;
use crate::domain::generation::{SectionSizes, TokenBudget};
use crate::domain::session::ContextOptions;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    #[error("Chapter not found in blueprint: {0}")]
    ChapterNotFound(u32),

    #[error("Context exceeds budget: {0}")]
    OverBudget(String),

    #[error("Context source unavailable: {0}")]
    Unavailable(String),
}

impl ContextError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ContextError::Unavailable(_))
    }
}

/// 前文章节摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDigest {
    pub number: u32,
    pub title: String,
    pub summary: String,
    /// 章节末尾片段，用于衔接
    pub closing_text: String,
}

/// 上下文构建请求
#[derive(Debug, Clone)]
pub struct ContextRequest {
    pub blueprint: Arc<BookBlueprint>,
    pub chapter: u32,
    /// 按章节顺序排列的前文摘要
    pub previous: Vec<ChapterDigest>,
    pub options: ContextOptions,
}

/// 组装完成的章节上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltContext {
    pub system_prompt: String,
    pub narrative: String,
    pub character: String,
    pub world: String,
    pub plot: String,
    pub style: String,
    pub chapter_instructions: String,
    pub previous_summaries: Vec<String>,
    /// 角色状态快照
    pub character_states: Vec<String>,
    /// 本章需要回收的伏笔
    pub payoffs_due: Vec<String>,
    /// 本章埋下的伏笔
    pub open_setups: Vec<String>,
    pub estimated_tokens: usize,
}

/// Context Builder Port
#[async_trait]
pub trait ContextBuilderPort: Send + Sync {
    /// 测量各分区原始内容大小（token 估算），用于预算分配
    async fn measure(&self, request: &ContextRequest) -> Result<SectionSizes, ContextError>;

    /// 在预算内构建上下文
    async fn build(
        &self,
        request: &ContextRequest,
        budget: &TokenBudget,
    ) -> Result<BuiltContext, ContextError>;
}
