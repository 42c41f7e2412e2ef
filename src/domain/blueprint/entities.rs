//! Blueprint Context - Entities

use serde::{Deserialize, Serialize};

/// 角色设定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
    /// 角色退场（死亡/离开）的章节，之后的章节不应再出现
    #[serde(default)]
    pub exit_chapter: Option<u32>,
}

impl CharacterProfile {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            description: String::new(),
            traits: Vec::new(),
            exit_chapter: None,
        }
    }

    /// 角色在指定章节是否仍在场
    pub fn is_present_in(&self, chapter: u32) -> bool {
        self.exit_chapter.map_or(true, |exit| chapter <= exit)
    }
}

/// 章节蓝图 - 单章写作意图
///
/// 不变量:
/// - number 在书内唯一，从 1 开始连续
/// - target_words > 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterBlueprint {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    /// 本章必须覆盖的情节节拍
    #[serde(default)]
    pub beats: Vec<String>,
    #[serde(default)]
    pub pov_character: Option<String>,
    /// 本章出场角色
    #[serde(default)]
    pub characters: Vec<String>,
    /// 本章埋下的伏笔
    #[serde(default)]
    pub setups: Vec<String>,
    /// 本章需要回收的伏笔
    #[serde(default)]
    pub payoffs: Vec<String>,
    #[serde(default = "default_target_words")]
    pub target_words: u32,
}

fn default_target_words() -> u32 {
    3000
}

impl ChapterBlueprint {
    pub fn new(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            synopsis: String::new(),
            beats: Vec::new(),
            pov_character: None,
            characters: Vec::new(),
            setups: Vec::new(),
            payoffs: Vec::new(),
            target_words: default_target_words(),
        }
    }

    /// 计划的场景数：每个节拍一个场景，无节拍时按字数估算
    pub fn planned_scene_count(&self) -> usize {
        if self.beats.is_empty() {
            ((self.target_words as usize) / 1200).clamp(1, 6)
        } else {
            self.beats.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_presence() {
        let mut profile = CharacterProfile::new("Mara", "mentor");
        assert!(profile.is_present_in(12));

        profile.exit_chapter = Some(4);
        assert!(profile.is_present_in(4));
        assert!(!profile.is_present_in(5));
    }

    #[test]
    fn test_planned_scene_count() {
        let mut chapter = ChapterBlueprint::new(1, "Arrival");
        chapter.target_words = 3000;
        assert_eq!(chapter.planned_scene_count(), 2);

        chapter.beats = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(chapter.planned_scene_count(), 3);
    }
}
