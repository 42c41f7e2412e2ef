//! Evaluation Reports - 质量 / 文风 / 连贯性评估报告

use serde::{Deserialize, Serialize};

/// 问题严重程度（有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minor" => Some(Severity::Minor),
            "moderate" => Some(Severity::Moderate),
            "major" => Some(Severity::Major),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 报告类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Continuity,
    Style,
    Quality,
}

/// 单个评估问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationIssue {
    pub category: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl EvaluationIssue {
    pub fn new(category: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            severity,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// 评估报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub kind: ReportKind,
    pub passed: bool,
    /// 0.0 ~ 1.0
    pub score: Option<f32>,
    pub issues: Vec<EvaluationIssue>,
}

impl EvaluationReport {
    pub fn new(kind: ReportKind, issues: Vec<EvaluationIssue>, score: Option<f32>) -> Self {
        Self {
            kind,
            passed: issues.is_empty(),
            score,
            issues,
        }
    }

    pub fn clean(kind: ReportKind) -> Self {
        Self::new(kind, Vec::new(), Some(1.0))
    }

    /// 达到或超过阈值的问题
    pub fn blocking_issues(&self, threshold: Severity) -> impl Iterator<Item = &EvaluationIssue> {
        self.issues.iter().filter(move |i| i.severity >= threshold)
    }

    pub fn passes(&self, threshold: Severity) -> bool {
        self.blocking_issues(threshold).next().is_none()
    }
}
