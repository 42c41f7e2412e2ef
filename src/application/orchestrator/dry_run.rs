//! Dry Run - 校验蓝图、章节范围和预算，不调用模型

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{ChapterDigest, ContextBuilderPort, ContextError, ContextRequest};
use crate::domain::blueprint::BookBlueprint;
use crate::domain::generation::{BudgetSection, TokenBudget, TokenBudgetAllocator};
use crate::domain::session::{ChapterStatus, GenerationSession};

/// 每个英文词约 1.33 token
const TOKENS_PER_WORD: f64 = 4.0 / 3.0;

/// 单章计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunChapter {
    pub number: u32,
    pub title: String,
    pub target_words: u32,
    pub planned_scenes: usize,
    /// 上下文实际占用（测量值与分配值取小）
    pub estimated_prompt_tokens: usize,
    pub estimated_output_tokens: usize,
    pub budget: TokenBudget,
}

/// 试运行报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunReport {
    pub book_title: String,
    pub first_chapter: u32,
    pub last_chapter: u32,
    pub context_window: usize,
    /// 不考虑内容大小的按权重分配
    pub budget: TokenBudget,
    pub chapters: Vec<DryRunChapter>,
    /// 从之前会话导入而跳过的章节
    pub skipped_chapters: Vec<u32>,
    pub estimated_prompt_tokens: usize,
    pub estimated_output_tokens: usize,
}

fn context_error(err: ContextError) -> ApplicationError {
    match err {
        ContextError::ChapterNotFound(n) => ApplicationError::not_found("Chapter", n),
        other => ApplicationError::internal(other.to_string()),
    }
}

pub(super) async fn plan(
    context_builder: &Arc<dyn ContextBuilderPort>,
    allocator: &TokenBudgetAllocator,
    context_window: usize,
    blueprint: &Arc<BookBlueprint>,
    session: &GenerationSession,
) -> Result<DryRunReport, ApplicationError> {
    let budget = allocator.allocate(context_window)?;
    let options = session.options();
    let range = session.chapter_range();

    let skipped_chapters: Vec<u32> = session
        .chapters()
        .iter()
        .filter(|c| range.contains(&c.number) && c.status == ChapterStatus::Skipped)
        .map(|c| c.number)
        .collect();

    let mut chapters = Vec::new();
    for chapter in blueprint
        .chapters
        .iter()
        .filter(|c| range.contains(&c.number) && !skipped_chapters.contains(&c.number))
    {
        // 尚未生成的前文以蓝图梗概代替摘要
        let previous = blueprint
            .chapters
            .iter()
            .filter(|c| c.number < chapter.number)
            .map(|c| ChapterDigest {
                number: c.number,
                title: c.title.clone(),
                summary: c.synopsis.clone(),
                closing_text: String::new(),
            })
            .collect();
        let request = ContextRequest {
            blueprint: blueprint.clone(),
            chapter: chapter.number,
            previous,
            options: options.context.clone(),
        };

        let measured = context_builder.measure(&request).await.map_err(context_error)?;
        let chapter_budget = allocator.allocate_with_measurements(context_window, &measured)?;
        let estimated_prompt_tokens = BudgetSection::ALL
            .iter()
            .map(|s| measured.get(s).copied().unwrap_or(0).min(chapter_budget.get(*s)))
            .sum();

        chapters.push(DryRunChapter {
            number: chapter.number,
            title: chapter.title.clone(),
            target_words: chapter.target_words,
            planned_scenes: chapter.planned_scene_count(),
            estimated_prompt_tokens,
            estimated_output_tokens: (chapter.target_words as f64 * TOKENS_PER_WORD).ceil()
                as usize,
            budget: chapter_budget,
        });
    }

    let report = DryRunReport {
        book_title: blueprint.title.clone(),
        first_chapter: *range.start(),
        last_chapter: *range.end(),
        context_window,
        budget,
        estimated_prompt_tokens: chapters.iter().map(|c| c.estimated_prompt_tokens).sum(),
        estimated_output_tokens: chapters.iter().map(|c| c.estimated_output_tokens).sum(),
        chapters,
        skipped_chapters,
    };

    tracing::info!(
        book = %report.book_title,
        chapters = report.chapters.len(),
        skipped = report.skipped_chapters.len(),
        prompt_tokens = report.estimated_prompt_tokens,
        output_tokens = report.estimated_output_tokens,
        "Dry run planned"
    );
    Ok(report)
}
