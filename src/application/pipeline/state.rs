//! Pipeline State - 单次章节运行的共享状态

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::ports::{BuiltContext, ChapterDigest};
use crate::domain::blueprint::{BookBlueprint, ChapterBlueprint};
use crate::domain::generation::{
    EvaluationIssue, EvaluationReport, GeneratedChapter, GeneratedScene, Severity, StepResult,
    TokenBudget, TokenUsage,
};
use crate::domain::session::ContextOptions;

/// 模型调用参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// 为空时使用模型服务默认模型
    pub model: Option<String>,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.8,
        }
    }
}

/// 作者指令（重新生成时的保留/修改要求，修订说明）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInstructions {
    #[serde(default)]
    pub keep: Vec<String>,
    #[serde(default)]
    pub change: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AuthorInstructions {
    pub fn is_empty(&self) -> bool {
        self.keep.is_empty()
            && self.change.is_empty()
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
    }

    /// 转为逐条指令文本
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.extend(self.keep.iter().map(|k| format!("Keep: {}", k)));
        lines.extend(self.change.iter().map(|c| format!("Change: {}", c)));
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            lines.push(notes.trim().to_string());
        }
        lines
    }
}

/// 章节生成上下文
///
/// 每章（或每次重新生成）新建；组装后的上下文和预算由 build-context 步骤填充
#[derive(Debug, Clone)]
pub struct ChapterGenerationContext {
    pub blueprint: Arc<BookBlueprint>,
    pub previous: Vec<ChapterDigest>,
    pub options: ContextOptions,
    pub params: GenerationParams,
    pub instructions: AuthorInstructions,
    pub budget: Option<TokenBudget>,
    pub assembled: Option<BuiltContext>,
}

impl ChapterGenerationContext {
    pub fn new(blueprint: Arc<BookBlueprint>, previous: Vec<ChapterDigest>) -> Self {
        Self {
            blueprint,
            previous,
            options: ContextOptions::default(),
            params: GenerationParams::default(),
            instructions: AuthorInstructions::default(),
            budget: None,
            assembled: None,
        }
    }

    pub fn with_options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_instructions(mut self, instructions: AuthorInstructions) -> Self {
        self.instructions = instructions;
        self
    }
}

/// 流水线状态
///
/// 由一次流水线执行独占，依次传递给每个步骤
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub context: ChapterGenerationContext,
    pub chapter: ChapterBlueprint,
    pub outline: Vec<String>,
    pub scenes: Vec<GeneratedScene>,
    /// assemble-chapter 的产物
    pub content: Option<String>,
    /// revision 的产物，下一次 assemble 时采用
    pub revised_content: Option<String>,
    pub continuity_report: Option<EvaluationReport>,
    pub style_report: Option<EvaluationReport>,
    pub quality_report: Option<EvaluationReport>,
    /// 待执行的修订指令
    pub revision_instructions: Vec<String>,
    pub final_chapter: Option<GeneratedChapter>,
    pub step_results: Vec<StepResult>,
    pub tokens: TokenUsage,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 当前修订轮次
    pub iteration: u32,
    /// 实际执行的修订次数
    pub revisions_applied: u32,
    /// 本次运行之前的尝试次数（修订入口为上一版的 attempt_count，否则为 1）
    pub base_attempts: u32,
    pub severity_threshold: Severity,
    pub requires_manual_review: bool,
    /// 实际使用的模型
    pub model_used: Option<String>,
}

impl PipelineState {
    pub fn new(
        context: ChapterGenerationContext,
        chapter: ChapterBlueprint,
        severity_threshold: Severity,
    ) -> Self {
        Self {
            context,
            chapter,
            outline: Vec::new(),
            scenes: Vec::new(),
            content: None,
            revised_content: None,
            continuity_report: None,
            style_report: None,
            quality_report: None,
            revision_instructions: Vec::new(),
            final_chapter: None,
            step_results: Vec::new(),
            tokens: TokenUsage::default(),
            elapsed_ms: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            iteration: 0,
            revisions_applied: 0,
            base_attempts: 1,
            severity_threshold,
            requires_manual_review: false,
            model_used: None,
        }
    }

    /// 以上一版章节为起点（修订入口）
    pub fn seeded(
        context: ChapterGenerationContext,
        chapter: ChapterBlueprint,
        severity_threshold: Severity,
        previous: &GeneratedChapter,
    ) -> Self {
        let mut state = Self::new(context, chapter, severity_threshold);
        state.outline = previous.outline.clone();
        state.scenes = previous.scenes.clone();
        state.content = Some(previous.content.clone());
        state.revised_content = Some(previous.content.clone());
        state.base_attempts = previous.attempt_count.max(1);
        state.revision_instructions = state.context.instructions.to_lines();
        state
    }

    /// 当前最新的正文（修订稿优先）
    pub fn current_text(&self) -> Option<&str> {
        self.revised_content
            .as_deref()
            .or(self.content.as_deref())
    }

    pub fn reports(&self) -> impl Iterator<Item = &EvaluationReport> {
        [&self.continuity_report, &self.style_report, &self.quality_report]
            .into_iter()
            .flatten()
    }

    /// 达到阈值的未解决问题
    pub fn blocking_issues(&self) -> Vec<EvaluationIssue> {
        let threshold = self.severity_threshold;
        self.reports()
            .flat_map(|r| r.blocking_issues(threshold))
            .cloned()
            .collect()
    }

    pub fn has_blocking_issues(&self) -> bool {
        let threshold = self.severity_threshold;
        self.reports().any(|r| !r.passes(threshold))
    }

    pub fn clear_reports(&mut self) {
        self.continuity_report = None;
        self.style_report = None;
        self.quality_report = None;
    }

    pub fn record_usage(&mut self, usage: TokenUsage, model: &str) {
        self.tokens += usage;
        if !model.is_empty() {
            self.model_used = Some(model.to_string());
        }
    }

    /// attempt_count = 之前的尝试次数 + 实际执行的修订次数
    pub fn attempt_count(&self) -> u32 {
        self.base_attempts + self.revisions_applied
    }
}
