//! Heuristic Quality Evaluator
//!
//! 质量：实际字数与目标字数的比例
//! 文风：重复句、句首重复、超长段落

use async_trait::async_trait;
use std::collections::HashMap;

use crate::application::ports::{EvaluationInput, EvaluatorError, QualityEvaluatorPort};
use crate::domain::generation::{
    count_words, EvaluationIssue, EvaluationReport, ReportKind, Severity,
};

/// 质量阈值
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    /// 低于该比例为 Major
    pub major_length_ratio: f32,
    /// 低于该比例为 Moderate
    pub moderate_length_ratio: f32,
    /// 超过该比例为 Minor（写得过长）
    pub overlong_ratio: f32,
    /// 单段词数上限
    pub max_paragraph_words: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            major_length_ratio: 0.3,
            moderate_length_ratio: 0.6,
            overlong_ratio: 2.0,
            max_paragraph_words: 900,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicQualityEvaluator {
    thresholds: QualityThresholds,
}

impl HeuristicQualityEvaluator {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    fn target_words(input: &EvaluationInput) -> Result<u32, EvaluatorError> {
        input
            .blueprint
            .chapter(input.chapter)
            .map(|c| c.target_words)
            .map_err(|e| EvaluatorError::InvalidInput(e.to_string()))
    }
}

fn sentences(text: &str) -> Vec<String> {
    text.split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect()
}

#[async_trait]
impl QualityEvaluatorPort for HeuristicQualityEvaluator {
    async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationReport, EvaluatorError> {
        let target = Self::target_words(input)?.max(1) as f32;
        let words = count_words(&input.content);
        let ratio = words as f32 / target;

        let mut issues = Vec::new();
        if words == 0 {
            issues.push(EvaluationIssue::new(
                "length",
                Severity::Critical,
                "Chapter has no content",
            ));
        } else if ratio < self.thresholds.major_length_ratio {
            issues.push(
                EvaluationIssue::new(
                    "length",
                    Severity::Major,
                    format!("Chapter has {} words, far below the target of {}", words, target),
                )
                .with_suggestion("Expand the scenes to cover every planned beat"),
            );
        } else if ratio < self.thresholds.moderate_length_ratio {
            issues.push(EvaluationIssue::new(
                "length",
                Severity::Moderate,
                format!("Chapter has {} words, below the target of {}", words, target),
            ));
        } else if ratio > self.thresholds.overlong_ratio {
            issues.push(EvaluationIssue::new(
                "length",
                Severity::Minor,
                format!("Chapter has {} words, well above the target of {}", words, target),
            ));
        }

        let score = if ratio >= 1.0 {
            (1.0 / ratio).max(0.5)
        } else {
            ratio
        };
        let penalty: f32 = issues
            .iter()
            .map(|i| match i.severity {
                Severity::Minor => 0.05,
                Severity::Moderate => 0.15,
                Severity::Major => 0.3,
                Severity::Critical => 1.0,
            })
            .sum();
        let score = (score - penalty).clamp(0.0, 1.0);

        Ok(EvaluationReport::new(ReportKind::Quality, issues, Some(score)))
    }

    async fn evaluate_style(
        &self,
        input: &EvaluationInput,
    ) -> Result<EvaluationReport, EvaluatorError> {
        let sentences = sentences(&input.content);
        let mut issues = Vec::new();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for s in &sentences {
            if count_words(s) >= 6 {
                *seen.entry(s.as_str()).or_default() += 1;
            }
        }
        let repeated = seen.values().filter(|n| **n > 2).count();
        if repeated > 0 {
            issues.push(EvaluationIssue::new(
                "repetition",
                Severity::Moderate,
                format!("{} sentences are repeated more than twice", repeated),
            ));
        }

        if sentences.len() >= 5 {
            let mut openers: HashMap<String, usize> = HashMap::new();
            for s in &sentences {
                if let Some(first) = s.split_whitespace().next() {
                    *openers.entry(first.to_lowercase()).or_default() += 1;
                }
            }
            if let Some((word, count)) = openers.iter().max_by_key(|(_, n)| **n) {
                if *count * 2 > sentences.len() {
                    issues.push(EvaluationIssue::new(
                        "sentence_openers",
                        Severity::Minor,
                        format!("{} of {} sentences start with \"{}\"", count, sentences.len(), word),
                    ));
                }
            }
        }

        let long_paragraphs = input
            .content
            .split("\n\n")
            .filter(|p| count_words(p) > self.thresholds.max_paragraph_words)
            .count();
        if long_paragraphs > 0 {
            issues.push(
                EvaluationIssue::new(
                    "paragraphs",
                    Severity::Minor,
                    format!("{} paragraphs are very long", long_paragraphs),
                )
                .with_suggestion("Break long passages at scene or speaker changes"),
            );
        }

        let score = (1.0 - 0.1 * issues.len() as f32).max(0.0);
        Ok(EvaluationReport::new(ReportKind::Style, issues, Some(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::{BookBlueprint, ChapterBlueprint};
    use std::sync::Arc;

    fn input(content: &str) -> EvaluationInput {
        let mut chapter = ChapterBlueprint::new(1, "Opening");
        chapter.target_words = 100;
        EvaluationInput {
            blueprint: Arc::new(BookBlueprint::new("Book", vec![chapter])),
            chapter: 1,
            content: content.to_string(),
            previous: Vec::new(),
        }
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[tokio::test]
    async fn test_length_severity() {
        let evaluator = HeuristicQualityEvaluator::default();

        let report = evaluator.evaluate(&input(&words(100))).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.score, Some(1.0));

        let report = evaluator.evaluate(&input(&words(50))).await.unwrap();
        assert_eq!(report.issues[0].severity, Severity::Moderate);

        let report = evaluator.evaluate(&input(&words(10))).await.unwrap();
        assert_eq!(report.issues[0].severity, Severity::Major);

        let report = evaluator.evaluate(&input("")).await.unwrap();
        assert_eq!(report.issues[0].severity, Severity::Critical);
        assert_eq!(report.score, Some(0.0));
    }

    #[tokio::test]
    async fn test_unknown_chapter() {
        let evaluator = HeuristicQualityEvaluator::default();
        let mut bad = input("text");
        bad.chapter = 5;
        assert!(matches!(
            evaluator.evaluate(&bad).await,
            Err(EvaluatorError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_style_repetition() {
        let evaluator = HeuristicQualityEvaluator::default();
        let text = "The lamp burned low over the harbour. ".repeat(4);
        let report = evaluator.evaluate_style(&input(&text)).await.unwrap();
        assert!(report
            .issues
            .iter()
            .any(|i| i.category == "repetition" && i.severity == Severity::Moderate));
        assert!(report.issues.iter().all(|i| i.severity < Severity::Major));
    }

    #[tokio::test]
    async fn test_style_clean() {
        let evaluator = HeuristicQualityEvaluator::default();
        let report = evaluator
            .evaluate_style(&input("Mara woke early. Rain fell on the pier."))
            .await
            .unwrap();
        assert!(report.passed);
    }
}
