//! Pipeline Step - 步骤抽象与注册表

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::PipelineState;
use crate::application::ports::{ContextError, EvaluatorError, PipelineProgress, ProviderError};

/// 步骤类型，声明顺序即默认执行顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    BuildContext,
    GenerateOutline,
    GenerateScenes,
    Revision,
    AssembleChapter,
    ContinuityCheck,
    StyleCheck,
    QualityEvaluation,
    Finalize,
}

impl StepKind {
    pub const ALL: [StepKind; 9] = [
        StepKind::BuildContext,
        StepKind::GenerateOutline,
        StepKind::GenerateScenes,
        StepKind::Revision,
        StepKind::AssembleChapter,
        StepKind::ContinuityCheck,
        StepKind::StyleCheck,
        StepKind::QualityEvaluation,
        StepKind::Finalize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StepKind::BuildContext => "build-context",
            StepKind::GenerateOutline => "generate-outline",
            StepKind::GenerateScenes => "generate-scenes",
            StepKind::Revision => "revision",
            StepKind::AssembleChapter => "assemble-chapter",
            StepKind::ContinuityCheck => "continuity-check",
            StepKind::StyleCheck => "style-check",
            StepKind::QualityEvaluation => "quality-evaluation",
            StepKind::Finalize => "finalize",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn order(&self) -> u32 {
        *self as u32
    }

    pub fn default_policy(&self) -> StepPolicy {
        match self {
            StepKind::BuildContext | StepKind::GenerateOutline | StepKind::GenerateScenes => {
                StepPolicy::new(true, true, 2)
            }
            StepKind::Revision => StepPolicy::new(false, true, 2),
            StepKind::AssembleChapter | StepKind::Finalize => StepPolicy::new(true, false, 0),
            StepKind::ContinuityCheck | StepKind::StyleCheck | StepKind::QualityEvaluation => {
                StepPolicy::new(false, true, 1)
            }
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 步骤的必需性与重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicy {
    pub required: bool,
    pub retryable: bool,
    pub max_retries: u32,
}

impl StepPolicy {
    pub const fn new(required: bool, retryable: bool, max_retries: u32) -> Self {
        Self {
            required,
            retryable,
            max_retries,
        }
    }
}

/// 步骤错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    /// 可重试
    #[error("{0}")]
    Transient(String),

    /// 不可重试
    #[error("{0}")]
    Fatal(String),

    /// 前序步骤的产物缺失，立即失败
    #[error("{step} requires {missing}")]
    MissingInput {
        step: &'static str,
        missing: &'static str,
    },

    #[error("cancelled")]
    Cancelled,
}

impl StepError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }
}

impl From<ProviderError> for StepError {
    fn from(err: ProviderError) -> Self {
        if err.is_transient() {
            StepError::Transient(err.to_string())
        } else {
            StepError::Fatal(err.to_string())
        }
    }
}

impl From<ContextError> for StepError {
    fn from(err: ContextError) -> Self {
        if err.is_transient() {
            StepError::Transient(err.to_string())
        } else {
            StepError::Fatal(err.to_string())
        }
    }
}

impl From<EvaluatorError> for StepError {
    fn from(err: EvaluatorError) -> Self {
        if err.is_transient() {
            StepError::Transient(err.to_string())
        } else {
            StepError::Fatal(err.to_string())
        }
    }
}

/// 流水线进度观察者
pub trait PipelineObserver: Send + Sync {
    fn on_progress(&self, progress: PipelineProgress);
}

impl PipelineObserver for () {
    fn on_progress(&self, _progress: PipelineProgress) {}
}

/// 步骤执行上下文：取消信号与进度上报
pub struct StepContext<'a> {
    pub cancel: &'a CancellationToken,
    observer: &'a dyn PipelineObserver,
    step: &'static str,
    step_index: usize,
    step_count: usize,
    iteration: u32,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        cancel: &'a CancellationToken,
        observer: &'a dyn PipelineObserver,
        kind: StepKind,
        step_index: usize,
        step_count: usize,
        iteration: u32,
    ) -> Self {
        Self {
            cancel,
            observer,
            step: kind.name(),
            step_index,
            step_count,
            iteration,
        }
    }

    /// 上报步骤内进度（流式片段、场景完成等）
    pub fn report(&self, step_percent: f32, partial_text: Option<String>, word_count: usize) {
        self.observer.on_progress(self.progress(step_percent, partial_text, word_count));
    }

    pub(crate) fn progress(
        &self,
        step_percent: f32,
        partial_text: Option<String>,
        word_count: usize,
    ) -> PipelineProgress {
        let step_percent = step_percent.clamp(0.0, 100.0);
        let count = self.step_count.max(1) as f32;
        let overall = (self.step_index as f32 + step_percent / 100.0) / count * 100.0;
        PipelineProgress {
            step_index: self.step_index,
            step_count: self.step_count,
            step: self.step.to_string(),
            iteration: self.iteration,
            overall_percent: overall.min(100.0),
            step_percent,
            partial_text,
            word_count,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// 流水线步骤
///
/// 步骤只读写 PipelineState 并调用协作者，不接触会话
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn kind(&self) -> StepKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn order(&self) -> u32 {
        self.kind().order()
    }

    fn policy(&self) -> StepPolicy {
        self.kind().default_policy()
    }

    /// 执行步骤，返回写入 StepResult 的输出摘要
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError>;
}

/// 步骤注册表
///
/// 按 StepKind 注册步骤实现，可添加、替换或移除；执行顺序按 order 排序
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: BTreeMap<StepKind, Arc<dyn PipelineStep>>,
    overrides: HashMap<StepKind, StepPolicy>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册步骤，返回被替换的旧实现
    pub fn register(&mut self, step: Arc<dyn PipelineStep>) -> Option<Arc<dyn PipelineStep>> {
        self.steps.insert(step.kind(), step)
    }

    pub fn remove(&mut self, kind: StepKind) -> Option<Arc<dyn PipelineStep>> {
        self.steps.remove(&kind)
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.steps.contains_key(&kind)
    }

    /// 覆盖步骤的默认策略
    pub fn set_policy(&mut self, kind: StepKind, policy: StepPolicy) {
        self.overrides.insert(kind, policy);
    }

    pub fn policy(&self, step: &dyn PipelineStep) -> StepPolicy {
        self.overrides
            .get(&step.kind())
            .copied()
            .unwrap_or_else(|| step.policy())
    }

    /// 按 order 排序的步骤列表
    pub fn ordered(&self) -> Vec<Arc<dyn PipelineStep>> {
        let mut steps: Vec<_> = self.steps.values().cloned().collect();
        steps.sort_by_key(|s| (s.order(), s.kind()));
        steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_and_policy() {
        let names: Vec<_> = StepKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names[0], "build-context");
        assert_eq!(names[3], "revision");
        assert_eq!(names[8], "finalize");
        assert!(StepKind::ALL.windows(2).all(|w| w[0].order() < w[1].order()));

        let policy = StepKind::AssembleChapter.default_policy();
        assert!(policy.required);
        assert!(!policy.retryable);
        assert_eq!(StepKind::GenerateOutline.default_policy().max_retries, 2);
        assert!(!StepKind::QualityEvaluation.default_policy().required);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(StepKind::from_name("style-check"), Some(StepKind::StyleCheck));
        assert_eq!(StepKind::from_name("unknown"), None);
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(StepError::from(ProviderError::Timeout).is_retryable());
        assert!(!StepError::from(ProviderError::Authentication("bad key".into())).is_retryable());
        assert!(!StepError::Cancelled.is_retryable());
    }
}
