//! Generated Chapter - 流水线产物

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EvaluationIssue;

/// 统计字数：CJK 字符逐字计数，其余按空白分词
pub fn count_words(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for ch in text.chars() {
        if is_cjk(ch) {
            count += 1;
            in_word = false;
        } else if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }
    count
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x30FF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF)
}

/// 生成的场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedScene {
    pub index: usize,
    /// 场景对应的大纲节拍
    pub beat: String,
    pub content: String,
    pub word_count: usize,
}

impl GeneratedScene {
    pub fn new(index: usize, beat: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            index,
            beat: beat.into(),
            word_count: count_words(&content),
            content,
        }
    }
}

/// 生成的章节 - 返回给调用方的最终产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedChapter {
    /// 每次生成尝试唯一
    pub attempt_id: Uuid,
    pub number: u32,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    pub scenes: Vec<GeneratedScene>,
    pub outline: Vec<String>,
    /// 供后续章节上下文使用的摘要
    pub summary: String,
    pub quality_score: Option<f32>,
    /// 1 + 实际执行的修订轮数
    pub attempt_count: u32,
    pub revision_iterations: u32,
    /// 修订轮数耗尽仍未通过质量门
    pub requires_manual_review: bool,
    pub unresolved_issues: Vec<EvaluationIssue>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}
