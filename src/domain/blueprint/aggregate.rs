//! Blueprint Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BlueprintError, BlueprintId, ChapterBlueprint, CharacterProfile};

/// 全书蓝图聚合根
///
/// 不变量:
/// - 至少包含一个章节
/// - 章节编号从 1 开始连续递增
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookBlueprint {
    #[serde(default)]
    pub id: BlueprintId,
    pub title: String,
    #[serde(default)]
    pub premise: String,
    #[serde(default)]
    pub genre: String,
    /// 文风要求（语气、人称、禁用表达等）
    #[serde(default)]
    pub style_guide: String,
    #[serde(default)]
    pub world_notes: String,
    #[serde(default)]
    pub characters: Vec<CharacterProfile>,
    pub chapters: Vec<ChapterBlueprint>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl BookBlueprint {
    pub fn new(title: impl Into<String>, chapters: Vec<ChapterBlueprint>) -> Self {
        Self {
            id: BlueprintId::new(),
            title: title.into(),
            premise: String::new(),
            genre: String::new(),
            style_guide: String::new(),
            world_notes: String::new(),
            characters: Vec::new(),
            chapters,
            updated_at: Utc::now(),
        }
    }

    /// 校验蓝图结构
    pub fn validate(&self) -> Result<(), BlueprintError> {
        if self.title.trim().is_empty() {
            return Err(BlueprintError::EmptyTitle);
        }
        if self.chapters.is_empty() {
            return Err(BlueprintError::NoChapters);
        }
        for (index, chapter) in self.chapters.iter().enumerate() {
            let expected = index as u32 + 1;
            if chapter.number != expected {
                return Err(BlueprintError::NonContiguousChapters {
                    expected,
                    found: chapter.number,
                });
            }
            if chapter.target_words == 0 {
                return Err(BlueprintError::InvalidTargetWords(chapter.number));
            }
        }
        Ok(())
    }

    pub fn chapter_count(&self) -> u32 {
        self.chapters.len() as u32
    }

    pub fn chapter(&self, number: u32) -> Result<&ChapterBlueprint, BlueprintError> {
        self.chapters
            .iter()
            .find(|c| c.number == number)
            .ok_or(BlueprintError::ChapterNotFound(number))
    }

    pub fn character(&self, name: &str) -> Option<&CharacterProfile> {
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters(n: u32) -> Vec<ChapterBlueprint> {
        (1..=n)
            .map(|i| ChapterBlueprint::new(i, format!("Chapter {}", i)))
            .collect()
    }

    #[test]
    fn test_valid_blueprint() {
        let blueprint = BookBlueprint::new("The Salt Road", chapters(3));
        assert!(blueprint.validate().is_ok());
        assert_eq!(blueprint.chapter_count(), 3);
        assert_eq!(blueprint.chapter(2).unwrap().title, "Chapter 2");
    }

    #[test]
    fn test_rejects_gap_in_numbering() {
        let mut list = chapters(3);
        list[2].number = 5;
        let blueprint = BookBlueprint::new("Gaps", list);
        assert_eq!(
            blueprint.validate(),
            Err(BlueprintError::NonContiguousChapters {
                expected: 3,
                found: 5
            })
        );
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            BookBlueprint::new("Empty", vec![]).validate(),
            Err(BlueprintError::NoChapters)
        );
        assert_eq!(
            BookBlueprint::new("  ", chapters(1)).validate(),
            Err(BlueprintError::EmptyTitle)
        );
    }
}
