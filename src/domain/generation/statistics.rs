//! Generation Statistics - 从会话记录派生的统计
//!
//! 统计不单独存储，每次都从章节记录与步骤结果重新计算

use serde::{Deserialize, Serialize};

use super::TokenUsage;
use crate::domain::session::{ChapterStatus, GenerationSession, SessionId, SessionStatus};

/// 单章统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterStatistics {
    pub number: u32,
    pub title: String,
    pub status: ChapterStatus,
    pub word_count: usize,
    pub tokens: TokenUsage,
    pub generation_ms: u64,
    pub attempt_count: u32,
    pub revision_iterations: u32,
    pub quality_score: Option<f32>,
    pub requires_manual_review: bool,
    pub runs: usize,
}

/// 全书统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStatistics {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub total_chapters: usize,
    pub completed_chapters: usize,
    pub failed_chapters: usize,
    pub pending_chapters: usize,
    pub awaiting_approval_chapters: usize,
    pub skipped_chapters: usize,
    pub total_words: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: f64,
    pub total_generation_ms: u64,
    pub average_words_per_chapter: f64,
    pub average_generation_ms: f64,
    pub words_per_minute: f64,
    pub cost_per_word: f64,
    /// 按已生成章节的平均费用外推全书费用
    pub estimated_total_cost: f64,
    pub average_quality_score: f64,
    pub chapters_requiring_review: usize,
    pub total_revision_iterations: u32,
    pub chapters: Vec<ChapterStatistics>,
}

/// 计算会话统计（纯函数，没有已生成章节时全部为零）
pub fn compute_statistics(session: &GenerationSession) -> GenerationStatistics {
    let chapters: Vec<ChapterStatistics> = session
        .chapters()
        .iter()
        .map(|record| {
            let tokens = record
                .runs
                .iter()
                .fold(TokenUsage::default(), |acc, run| acc + run.tokens());
            let generated = record.chapter.as_ref().filter(|_| !record.imported);
            ChapterStatistics {
                number: record.number,
                title: record.title.clone(),
                status: record.status,
                word_count: generated.map(|c| c.word_count).unwrap_or(0),
                tokens,
                generation_ms: record.runs.iter().map(|run| run.execution_ms()).sum(),
                attempt_count: generated.map(|c| c.attempt_count).unwrap_or(0),
                revision_iterations: generated.map(|c| c.revision_iterations).unwrap_or(0),
                quality_score: generated.and_then(|c| c.quality_score),
                requires_manual_review: generated.map(|c| c.requires_manual_review).unwrap_or(false),
                runs: record.runs.len(),
            }
        })
        .collect();

    let count = |pred: fn(ChapterStatus) -> bool| chapters.iter().filter(|c| pred(c.status)).count();
    let completed_chapters = count(|s| s.is_finalized());
    let failed_chapters = count(|s| s == ChapterStatus::Failed);
    let pending_chapters = count(|s| {
        matches!(
            s,
            ChapterStatus::Pending | ChapterStatus::Generating | ChapterStatus::RevisionRequested
        )
    });
    let awaiting_approval_chapters = count(|s| s == ChapterStatus::AwaitingApproval);
    let skipped_chapters = count(|s| s == ChapterStatus::Skipped);

    let produced = session
        .chapters()
        .iter()
        .filter(|r| r.chapter.is_some() && !r.imported)
        .count();

    let tokens = chapters
        .iter()
        .fold(TokenUsage::default(), |acc, c| acc + c.tokens);
    let total_words: usize = chapters.iter().map(|c| c.word_count).sum();
    let total_generation_ms: u64 = chapters.iter().map(|c| c.generation_ms).sum();
    let scores: Vec<f32> = chapters.iter().filter_map(|c| c.quality_score).collect();

    let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
    let minutes = total_generation_ms as f64 / 60_000.0;
    let average_cost = ratio(tokens.estimated_cost, produced as f64);

    GenerationStatistics {
        session_id: *session.id(),
        status: session.status(),
        total_chapters: chapters.len(),
        completed_chapters,
        failed_chapters,
        pending_chapters,
        awaiting_approval_chapters,
        skipped_chapters,
        total_words,
        total_input_tokens: tokens.input_tokens,
        total_output_tokens: tokens.output_tokens,
        total_cost: tokens.estimated_cost,
        total_generation_ms,
        average_words_per_chapter: ratio(total_words as f64, produced as f64),
        average_generation_ms: ratio(total_generation_ms as f64, produced as f64),
        words_per_minute: ratio(total_words as f64, minutes),
        cost_per_word: ratio(tokens.estimated_cost, total_words as f64),
        estimated_total_cost: average_cost * chapters.len() as f64,
        average_quality_score: ratio(
            scores.iter().map(|s| f64::from(*s)).sum(),
            scores.len() as f64,
        ),
        chapters_requiring_review: chapters.iter().filter(|c| c.requires_manual_review).count(),
        total_revision_iterations: chapters.iter().map(|c| c.revision_iterations).sum(),
        chapters,
    }
}
