//! Evaluator Ports - 质量评估与连贯性检查

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::{ChapterDigest, ProviderError};
use crate::domain::blueprint::BookBlueprint;
use crate::domain::generation::EvaluationReport;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluatorError {
    #[error("Evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("Evaluator provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid evaluation input: {0}")]
    InvalidInput(String),
}

impl EvaluatorError {
    pub fn is_transient(&self) -> bool {
        match self {
            EvaluatorError::Unavailable(_) => true,
            EvaluatorError::Provider(e) => e.is_transient(),
            EvaluatorError::InvalidInput(_) => false,
        }
    }
}

/// 评估输入
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub blueprint: Arc<BookBlueprint>,
    pub chapter: u32,
    pub content: String,
    pub previous: Vec<ChapterDigest>,
}

/// 质量与文风评估
#[async_trait]
pub trait QualityEvaluatorPort: Send + Sync {
    async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationReport, EvaluatorError>;

    async fn evaluate_style(&self, input: &EvaluationInput)
        -> Result<EvaluationReport, EvaluatorError>;
}

/// 连贯性检查
#[async_trait]
pub trait ContinuityCheckerPort: Send + Sync {
    async fn check(&self, input: &EvaluationInput) -> Result<EvaluationReport, EvaluatorError>;
}
