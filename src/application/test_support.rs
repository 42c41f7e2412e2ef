//! 测试辅助：脚本化评估器、示例蓝图、流水线装配

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::application::orchestrator::{BookGenerationOrchestrator, OrchestratorDeps};
use crate::application::pipeline::{
    ChapterGenerationPipeline, PipelineConfig, PipelineObserver, StepDependencies, StepRegistry,
};
use crate::application::ports::{
    ContinuityCheckerPort, EvaluationInput, EvaluatorError, PipelineProgress,
    QualityEvaluatorPort, TextGeneratorPort,
};
use crate::domain::blueprint::{BookBlueprint, ChapterBlueprint};
use crate::domain::generation::{
    BudgetWeights, EvaluationIssue, EvaluationReport, ReportKind, Severity, TokenBudgetAllocator,
};
use crate::infrastructure::adapters::{BlueprintContextBuilder, FakeLlmClient};
use crate::infrastructure::events::ProgressPublisher;
use crate::infrastructure::memory::{
    InMemoryBlueprintRepository, InMemorySessionRegistry, InMemorySessionRepository,
};

/// 按脚本依次返回报告的评估器；脚本耗尽后返回无问题的报告
#[derive(Default)]
pub struct ScriptedEvaluator {
    quality: Mutex<VecDeque<Result<EvaluationReport, EvaluatorError>>>,
    continuity: Mutex<VecDeque<Result<EvaluationReport, EvaluatorError>>>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_quality(&self, report: Result<EvaluationReport, EvaluatorError>) {
        self.quality.lock().unwrap().push_back(report);
    }

    pub fn push_continuity(&self, report: Result<EvaluationReport, EvaluatorError>) {
        self.continuity.lock().unwrap().push_back(report);
    }

    fn next(
        queue: &Mutex<VecDeque<Result<EvaluationReport, EvaluatorError>>>,
        kind: ReportKind,
    ) -> Result<EvaluationReport, EvaluatorError> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(EvaluationReport::clean(kind)))
    }
}

#[async_trait]
impl QualityEvaluatorPort for ScriptedEvaluator {
    async fn evaluate(&self, _input: &EvaluationInput) -> Result<EvaluationReport, EvaluatorError> {
        Self::next(&self.quality, ReportKind::Quality)
    }

    async fn evaluate_style(
        &self,
        _input: &EvaluationInput,
    ) -> Result<EvaluationReport, EvaluatorError> {
        Ok(EvaluationReport::clean(ReportKind::Style))
    }
}

#[async_trait]
impl ContinuityCheckerPort for ScriptedEvaluator {
    async fn check(&self, _input: &EvaluationInput) -> Result<EvaluationReport, EvaluatorError> {
        Self::next(&self.continuity, ReportKind::Continuity)
    }
}

/// 带一个指定严重度问题的质量报告
pub fn quality_issue(severity: Severity) -> EvaluationReport {
    EvaluationReport::new(
        ReportKind::Quality,
        vec![EvaluationIssue::new("pacing", severity, "The middle drags")],
        Some(0.4),
    )
}

/// 收集全部进度事件
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<PipelineProgress>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_progress(&self, progress: PipelineProgress) {
        self.events.lock().unwrap().push(progress);
    }
}

/// 每章两个节拍、目标 120 词的示例蓝图
pub fn blueprint(chapters: u32) -> BookBlueprint {
    let chapters = (1..=chapters)
        .map(|n| {
            let mut chapter = ChapterBlueprint::new(n, format!("Chapter {}", n));
            chapter.synopsis = format!("Events of chapter {}", n);
            chapter.beats = vec!["arrival".to_string(), "departure".to_string()];
            chapter.target_words = 120;
            chapter
        })
        .collect();
    let mut blueprint = BookBlueprint::new("Test Book", chapters);
    blueprint.premise = "A quiet harbour town keeps a secret.".to_string();
    blueprint
}

pub fn allocator() -> Arc<TokenBudgetAllocator> {
    Arc::new(TokenBudgetAllocator::new(BudgetWeights::default(), 1000, 10))
}

pub fn dependencies(
    generator: Arc<dyn TextGeneratorPort>,
    evaluator: Arc<ScriptedEvaluator>,
) -> StepDependencies {
    StepDependencies {
        generator,
        context_builder: Arc::new(BlueprintContextBuilder::new()),
        quality: evaluator.clone(),
        continuity: evaluator,
        allocator: allocator(),
        context_window: 8000,
    }
}

/// 快速退避的流水线配置
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry_backoff_ms: 1,
        max_backoff_ms: 5,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(
    generator: Arc<FakeLlmClient>,
    evaluator: Arc<ScriptedEvaluator>,
) -> ChapterGenerationPipeline {
    let registry = StepRegistry::standard(&dependencies(generator, evaluator));
    ChapterGenerationPipeline::new(registry, fast_config())
}

/// 使用内存仓储和注册表的编排器
pub fn orchestrator(generator: Arc<FakeLlmClient>) -> Arc<BookGenerationOrchestrator> {
    BookGenerationOrchestrator::new(OrchestratorDeps {
        pipeline: pipeline(generator, Arc::new(ScriptedEvaluator::new())),
        context_builder: Arc::new(BlueprintContextBuilder::new()),
        allocator: allocator(),
        context_window: 8000,
        sessions: InMemorySessionRepository::new().arc(),
        blueprints: InMemoryBlueprintRepository::new().arc(),
        registry: InMemorySessionRegistry::new().arc(),
        progress: ProgressPublisher::new(1024).arc(),
    })
    .arc()
}
