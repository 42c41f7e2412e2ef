//! Session Context - 生成选项

use serde::{Deserialize, Serialize};

/// 上下文包含选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOptions {
    #[serde(default = "default_true")]
    pub include_characters: bool,
    #[serde(default = "default_true")]
    pub include_locations: bool,
    #[serde(default = "default_true")]
    pub include_previous_summaries: bool,
    /// 纳入上下文的前文章节摘要数量
    #[serde(default = "default_previous_summary_count")]
    pub previous_summary_count: usize,
    /// 单个分区的 token 上限（在预算分配之外的额外限制）
    #[serde(default)]
    pub max_section_tokens: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn default_previous_summary_count() -> usize {
    3
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            include_characters: true,
            include_locations: true,
            include_previous_summaries: true,
            previous_summary_count: default_previous_summary_count(),
            max_section_tokens: None,
        }
    }
}

/// 全书生成选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// 起始章节（默认第 1 章）
    #[serde(default)]
    pub start_from_chapter: Option<u32>,
    /// 结束章节（默认最后一章）
    #[serde(default)]
    pub end_at_chapter: Option<u32>,
    /// 跳过之前会话中已定稿的章节
    #[serde(default)]
    pub skip_existing_chapters: bool,
    /// 只校验输入与预算，不调用模型
    #[serde(default)]
    pub dry_run: bool,
    /// 每章生成后等待作者审批
    #[serde(default)]
    pub require_approval: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub context: ContextOptions,
}
