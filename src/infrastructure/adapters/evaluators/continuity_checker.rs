//! Heuristic Continuity Checker
//!
//! 对照蓝图检查角色出场与伏笔回收

use async_trait::async_trait;

use crate::application::ports::{ContinuityCheckerPort, EvaluationInput, EvaluatorError};
use crate::domain::generation::{EvaluationIssue, EvaluationReport, ReportKind, Severity};

#[derive(Debug, Clone, Default)]
pub struct HeuristicContinuityChecker;

impl HeuristicContinuityChecker {
    pub fn new() -> Self {
        Self
    }
}

fn mentions(content: &str, phrase: &str) -> bool {
    let phrase = phrase.trim().to_lowercase();
    !phrase.is_empty() && content.contains(&phrase)
}

/// 伏笔按关键词匹配：过半关键词出现即视为已回收
fn covers(content: &str, payoff: &str) -> bool {
    let keywords: Vec<String> = payoff
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();
    if keywords.is_empty() {
        return mentions(content, payoff);
    }
    let hits = keywords.iter().filter(|k| content.contains(k.as_str())).count();
    hits * 2 >= keywords.len()
}

#[async_trait]
impl ContinuityCheckerPort for HeuristicContinuityChecker {
    async fn check(&self, input: &EvaluationInput) -> Result<EvaluationReport, EvaluatorError> {
        let chapter = input
            .blueprint
            .chapter(input.chapter)
            .map_err(|e| EvaluatorError::InvalidInput(e.to_string()))?;
        let content = input.content.to_lowercase();
        let mut issues = Vec::new();

        if let Some(pov) = &chapter.pov_character {
            if !mentions(&content, pov) {
                issues.push(
                    EvaluationIssue::new(
                        "pov",
                        Severity::Major,
                        format!("Point-of-view character {} never appears", pov),
                    )
                    .with_suggestion(format!("Narrate the chapter through {}", pov)),
                );
            }
        }

        for name in &chapter.characters {
            if chapter.pov_character.as_deref() == Some(name.as_str()) {
                continue;
            }
            if !mentions(&content, name) {
                issues.push(EvaluationIssue::new(
                    "cast",
                    Severity::Moderate,
                    format!("{} is listed for this chapter but does not appear", name),
                ));
            }
        }

        for character in &input.blueprint.characters {
            if character.is_present_in(input.chapter) {
                continue;
            }
            if chapter.characters.iter().any(|n| n.eq_ignore_ascii_case(&character.name)) {
                continue;
            }
            if mentions(&content, &character.name) {
                issues.push(EvaluationIssue::new(
                    "departed_character",
                    Severity::Critical,
                    format!(
                        "{} left the story in chapter {} but appears again",
                        character.name,
                        character.exit_chapter.unwrap_or_default()
                    ),
                ));
            }
        }

        for payoff in &chapter.payoffs {
            if !covers(&content, payoff) {
                issues.push(
                    EvaluationIssue::new(
                        "payoff",
                        Severity::Moderate,
                        format!("Setup \"{}\" is not paid off", payoff),
                    )
                    .with_suggestion(format!("Resolve \"{}\" in this chapter", payoff)),
                );
            }
        }

        let score = (1.0
            - issues
                .iter()
                .map(|i| match i.severity {
                    Severity::Minor => 0.05,
                    Severity::Moderate => 0.1,
                    Severity::Major => 0.3,
                    Severity::Critical => 0.5,
                })
                .sum::<f32>())
        .max(0.0);

        Ok(EvaluationReport::new(ReportKind::Continuity, issues, Some(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::{BookBlueprint, ChapterBlueprint, CharacterProfile};
    use std::sync::Arc;

    fn input(content: &str) -> EvaluationInput {
        let mut chapter = ChapterBlueprint::new(3, "Return");
        chapter.pov_character = Some("Mara".to_string());
        chapter.characters = vec!["Mara".to_string(), "Ines".to_string()];
        chapter.payoffs = vec!["the sealed letter".to_string()];

        let mut bp = BookBlueprint::new(
            "Tidebook",
            vec![
                ChapterBlueprint::new(1, "One"),
                ChapterBlueprint::new(2, "Two"),
                chapter,
            ],
        );
        let mut tomas = CharacterProfile::new("Tomas", "mentor");
        tomas.exit_chapter = Some(2);
        bp.characters = vec![
            CharacterProfile::new("Mara", "protagonist"),
            CharacterProfile::new("Ines", "friend"),
            tomas,
        ];

        EvaluationInput {
            blueprint: Arc::new(bp),
            chapter: 3,
            content: content.to_string(),
            previous: Vec::new(),
        }
    }

    fn severity_of(report: &EvaluationReport, category: &str) -> Option<Severity> {
        report
            .issues
            .iter()
            .find(|i| i.category == category)
            .map(|i| i.severity)
    }

    #[tokio::test]
    async fn test_consistent_chapter_passes() {
        let checker = HeuristicContinuityChecker::new();
        let report = checker
            .check(&input("Mara and Ines opened the sealed letter at dawn."))
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(report.score, Some(1.0));
    }

    #[tokio::test]
    async fn test_issue_severities() {
        let checker = HeuristicContinuityChecker::new();
        let report = checker
            .check(&input("Tomas walked the pier alone."))
            .await
            .unwrap();

        assert_eq!(severity_of(&report, "pov"), Some(Severity::Major));
        assert_eq!(severity_of(&report, "cast"), Some(Severity::Moderate));
        assert_eq!(severity_of(&report, "departed_character"), Some(Severity::Critical));
        assert_eq!(severity_of(&report, "payoff"), Some(Severity::Moderate));
        assert!(!report.passed);
    }
}
