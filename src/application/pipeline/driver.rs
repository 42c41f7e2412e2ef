//! Chapter Generation Pipeline - 步骤驱动
//!
//! 按顺序执行步骤、按策略重试、执行质量门修订循环

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{
    ChapterGenerationContext, PipelineObserver, PipelineState, PipelineStep, StepContext,
    StepError, StepKind, StepRegistry,
};
use crate::domain::blueprint::ChapterBlueprint;
use crate::domain::generation::{GeneratedChapter, Severity, StepResult, TokenUsage};

/// 流水线错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("step {step} failed after {attempts} attempt(s): {cause}")]
    StepFailed {
        step: String,
        attempts: u32,
        cause: String,
    },

    #[error("generation cancelled")]
    Cancelled,

    #[error("invalid pipeline input: {0}")]
    InvalidInput(String),
}

/// 流水线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 达到该严重度的问题阻止通过质量门
    pub severity_threshold: Severity,
    /// 修订轮数上限
    pub max_revision_iterations: u32,
    /// 重试退避基数（毫秒），每次翻倍
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            severity_threshold: Severity::Major,
            max_revision_iterations: 2,
            retry_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    /// 第 retry 次重试前的等待时间
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .retry_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// 一次流水线执行的结果
///
/// 无论成功与否都带回步骤记录（失败的运行同样消耗了 token）
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: Result<GeneratedChapter, PipelineError>,
    pub step_results: Vec<StepResult>,
    pub warnings: Vec<String>,
    pub tokens: TokenUsage,
    pub elapsed_ms: u64,
}

impl PipelineRun {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, Err(PipelineError::Cancelled))
    }

    /// 失败步骤名称
    pub fn failed_step(&self) -> Option<&str> {
        match &self.result {
            Err(PipelineError::StepFailed { step, .. }) => Some(step),
            _ => None,
        }
    }
}

/// 章节生成流水线
#[derive(Clone)]
pub struct ChapterGenerationPipeline {
    registry: StepRegistry,
    config: PipelineConfig,
}

impl ChapterGenerationPipeline {
    pub fn new(registry: StepRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// 从头生成一章
    pub async fn run(
        &self,
        context: ChapterGenerationContext,
        chapter: ChapterBlueprint,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> PipelineRun {
        let state = PipelineState::new(context, chapter, self.config.severity_threshold);
        self.drive(state, None, 0, cancel, observer).await
    }

    /// 以上一版章节和作者指令为起点，重建上下文后从 revision 步骤开始执行
    pub async fn revise(
        &self,
        context: ChapterGenerationContext,
        chapter: ChapterBlueprint,
        previous: &GeneratedChapter,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> PipelineRun {
        let steps = self.registry.ordered();
        let Some(start) = steps.iter().position(|s| s.kind() == StepKind::Revision) else {
            return PipelineRun {
                result: Err(PipelineError::InvalidInput(
                    "revision step is not registered".into(),
                )),
                step_results: Vec::new(),
                warnings: Vec::new(),
                tokens: TokenUsage::default(),
                elapsed_ms: 0,
            };
        };
        let prelude = steps[..start]
            .iter()
            .position(|s| s.kind() == StepKind::BuildContext);
        let state =
            PipelineState::seeded(context, chapter, self.config.severity_threshold, previous);
        self.drive(state, prelude, start, cancel, observer).await
    }

    /// `prelude` 是在 `start` 之前单独执行的步骤
    async fn drive(
        &self,
        mut state: PipelineState,
        prelude: Option<usize>,
        start: usize,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> PipelineRun {
        let started = Instant::now();
        let result = match prelude {
            Some(index) => self.execute_at(&mut state, index, cancel, observer).await,
            None => Ok(()),
        };
        let result = match result {
            Ok(()) => self.drive_steps(&mut state, start, cancel, observer).await,
            Err(err) => Err(err),
        };
        state.elapsed_ms = started.elapsed().as_millis() as u64;

        let result = result.and_then(|_| {
            state.final_chapter.take().ok_or_else(|| {
                PipelineError::InvalidInput("pipeline finished without a final chapter".into())
            })
        });

        PipelineRun {
            result,
            step_results: state.step_results,
            warnings: state.warnings,
            tokens: state.tokens,
            elapsed_ms: state.elapsed_ms,
        }
    }

    async fn drive_steps(
        &self,
        state: &mut PipelineState,
        start: usize,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> Result<(), PipelineError> {
        let steps = self.registry.ordered();
        let loop_start = steps.iter().position(|s| s.kind() == StepKind::Revision);
        // 质量门位于 finalize 之前（没有 finalize 时位于末尾）
        let gate = steps
            .iter()
            .position(|s| s.kind() == StepKind::Finalize)
            .unwrap_or(steps.len());

        let mut index = start;
        loop {
            if index == gate {
                if let Some(restart) = loop_start.filter(|r| *r < gate) {
                    if state.has_blocking_issues() {
                        if state.iteration < self.config.max_revision_iterations {
                            state.iteration += 1;
                            tracing::info!(
                                chapter = state.chapter.number,
                                iteration = state.iteration,
                                issues = state.blocking_issues().len(),
                                "Quality gate failed, revising"
                            );
                            index = restart;
                            continue;
                        }
                        tracing::warn!(
                            chapter = state.chapter.number,
                            iterations = state.iteration,
                            "Revision limit reached, chapter requires manual review"
                        );
                        state.requires_manual_review = true;
                    }
                }
            }

            let Some(step) = steps.get(index) else {
                break;
            };
            self.execute_step(step.as_ref(), state, index, steps.len(), cancel, observer)
                .await?;
            index += 1;
        }
        Ok(())
    }

    async fn execute_at(
        &self,
        state: &mut PipelineState,
        index: usize,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> Result<(), PipelineError> {
        let steps = self.registry.ordered();
        match steps.get(index) {
            Some(step) => {
                self.execute_step(step.as_ref(), state, index, steps.len(), cancel, observer)
                    .await
            }
            None => Ok(()),
        }
    }

    /// 执行单个步骤（含重试），并追加 StepResult
    async fn execute_step(
        &self,
        step: &dyn PipelineStep,
        state: &mut PipelineState,
        index: usize,
        count: usize,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> Result<(), PipelineError> {
        let policy = self.registry.policy(step);
        let ctx = StepContext::new(cancel, observer, step.kind(), index, count, state.iteration);
        let started = Instant::now();
        let tokens_before = state.tokens;
        let mut retries = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StepError::Cancelled),
                result = step.execute(state, &ctx) => result,
            };

            match outcome {
                Ok(output) => {
                    self.record(state, step, started, retries, tokens_before, None, false, output);
                    observer.on_progress(ctx.progress(100.0, None, current_words(state)));
                    return Ok(());
                }
                Err(StepError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err) if err.is_retryable() && policy.retryable && retries < policy.max_retries => {
                    let delay = self.config.backoff(retries);
                    retries += 1;
                    tracing::warn!(
                        chapter = state.chapter.number,
                        step = %step.name(),
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Step failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    let cause = err.to_string();
                    if policy.required {
                        tracing::error!(
                            chapter = state.chapter.number,
                            step = %step.name(),
                            attempts = retries + 1,
                            error = %cause,
                            "Required step failed"
                        );
                        self.record(state, step, started, retries, tokens_before, Some(cause.clone()), false, serde_json::Value::Null);
                        state.errors.push(format!("{}: {}", step.name(), cause));
                        return Err(PipelineError::StepFailed {
                            step: step.name().to_string(),
                            attempts: retries + 1,
                            cause,
                        });
                    }

                    tracing::warn!(
                        chapter = state.chapter.number,
                        step = %step.name(),
                        error = %cause,
                        "Optional step failed, skipping"
                    );
                    self.record(state, step, started, retries, tokens_before, Some(cause.clone()), true, serde_json::Value::Null);
                    state.warnings.push(format!("{} skipped: {}", step.name(), cause));
                    observer.on_progress(ctx.progress(100.0, None, current_words(state)));
                    return Ok(());
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        state: &mut PipelineState,
        step: &dyn PipelineStep,
        started: Instant,
        retries: u32,
        tokens_before: TokenUsage,
        error: Option<String>,
        skipped: bool,
        output: serde_json::Value,
    ) {
        let tokens = TokenUsage::new(
            state.tokens.input_tokens.saturating_sub(tokens_before.input_tokens),
            state.tokens.output_tokens.saturating_sub(tokens_before.output_tokens),
            (state.tokens.estimated_cost - tokens_before.estimated_cost).max(0.0),
        );
        tracing::debug!(
            chapter = state.chapter.number,
            step = %step.name(),
            iteration = state.iteration,
            success = error.is_none(),
            retries,
            "Step finished"
        );
        state.step_results.push(StepResult {
            step: step.name().to_string(),
            order: step.order(),
            iteration: state.iteration,
            success: error.is_none(),
            skipped,
            execution_ms: started.elapsed().as_millis() as u64,
            retry_count: retries,
            tokens,
            error,
            output,
        });
    }
}

fn current_words(state: &PipelineState) -> usize {
    match state.current_text() {
        Some(text) => crate::domain::generation::count_words(text),
        None => state.scenes.iter().map(|s| s.word_count).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::AuthorInstructions;
    use crate::application::ports::{EvaluatorError, GenerationPurpose, ProviderError};
    use crate::application::test_support::{
        blueprint, pipeline, quality_issue, RecordingObserver, ScriptedEvaluator,
    };
    use crate::infrastructure::adapters::FakeLlmClient;
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    fn fixtures() -> (Arc<FakeLlmClient>, Arc<ScriptedEvaluator>) {
        (
            Arc::new(FakeLlmClient::with_defaults()),
            Arc::new(ScriptedEvaluator::new()),
        )
    }

    fn context() -> (ChapterGenerationContext, ChapterBlueprint) {
        let blueprint = Arc::new(blueprint(3));
        let chapter = blueprint.chapters[0].clone();
        (ChapterGenerationContext::new(blueprint, Vec::new()), chapter)
    }

    fn step_names(run: &PipelineRun) -> Vec<&str> {
        run.step_results.iter().map(|r| r.step.as_str()).collect()
    }

    fn assert_ordered(run: &PipelineRun) {
        let keys: Vec<_> = run.step_results.iter().map(|r| r.sequence_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_run_produces_chapter() {
        let (generator, evaluator) = fixtures();
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();
        let observer = RecordingObserver::default();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &observer)
            .await;

        let generated = run.result.clone().unwrap();
        assert_eq!(generated.number, 1);
        assert_eq!(generated.attempt_count, 1);
        assert_eq!(generated.revision_iterations, 0);
        assert_eq!(generated.scenes.len(), 2);
        assert_eq!(generated.outline.len(), 2);
        assert!(generated.word_count > 0);
        assert!(!generated.requires_manual_review);
        assert_eq!(generated.model, "fake-writer");

        assert_eq!(
            step_names(&run),
            vec![
                "build-context",
                "generate-outline",
                "generate-scenes",
                "revision",
                "assemble-chapter",
                "continuity-check",
                "style-check",
                "quality-evaluation",
                "finalize",
            ]
        );
        assert!(run.step_results.iter().all(|r| r.success && r.retry_count == 0));
        assert_eq!(run.step_results[3].output["applied"], false);
        assert_eq!(generator.calls(GenerationPurpose::Revision), 0);
        assert!(run.tokens.total_tokens() > 0);

        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| e.partial_text.is_some()));
        let last = events.last().unwrap();
        assert_eq!(last.step, "finalize");
        assert!((last.overall_percent - 100.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_gate_failure_triggers_one_revision() {
        let (generator, evaluator) = fixtures();
        evaluator.push_quality(Ok(quality_issue(Severity::Major)));
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        let generated = run.result.clone().unwrap();
        assert_eq!(generated.attempt_count, 2);
        assert_eq!(generated.revision_iterations, 1);
        assert!(!generated.requires_manual_review);
        assert!(generated.unresolved_issues.is_empty());
        assert!(generated.content.contains("Revision pass 1."));
        assert_eq!(generator.calls(GenerationPurpose::Revision), 1);
        assert_ordered(&run);

        let second_pass: Vec<&str> = run
            .step_results
            .iter()
            .filter(|r| r.iteration == 1)
            .map(|r| r.step.as_str())
            .collect();
        assert_eq!(
            second_pass,
            vec![
                "revision",
                "assemble-chapter",
                "continuity-check",
                "style-check",
                "quality-evaluation",
                "finalize",
            ]
        );
    }

    #[tokio::test]
    async fn test_minor_issues_do_not_block() {
        let (generator, evaluator) = fixtures();
        evaluator.push_quality(Ok(quality_issue(Severity::Moderate)));
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        assert_eq!(run.result.unwrap().attempt_count, 1);
        assert_eq!(generator.calls(GenerationPurpose::Revision), 0);
    }

    #[tokio::test]
    async fn test_revision_loop_is_bounded() {
        let (generator, evaluator) = fixtures();
        for _ in 0..5 {
            evaluator.push_quality(Ok(quality_issue(Severity::Critical)));
        }
        let pipeline = pipeline(generator.clone(), evaluator);
        let max = pipeline.config().max_revision_iterations;
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        let generated = run.result.clone().unwrap();
        assert_eq!(generated.revision_iterations, max);
        assert_eq!(generated.attempt_count, max + 1);
        assert!(generated.requires_manual_review);
        assert_eq!(generated.unresolved_issues.len(), 1);
        assert_eq!(generator.calls(GenerationPurpose::Revision), max as usize);
        assert_eq!(
            run.step_results
                .iter()
                .filter(|r| r.step == "finalize")
                .count(),
            1
        );
        assert_ordered(&run);
    }

    #[tokio::test]
    async fn test_transient_outline_failures_are_retried() {
        let (generator, evaluator) = fixtures();
        generator.fail_next(GenerationPurpose::Outline, ProviderError::Timeout);
        generator.fail_next(GenerationPurpose::Outline, ProviderError::Timeout);
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        assert!(run.result.is_ok());
        let outline = run
            .step_results
            .iter()
            .find(|r| r.step == "generate-outline")
            .unwrap();
        assert!(outline.success);
        assert_eq!(outline.retry_count, 2);
        assert_eq!(generator.calls(GenerationPurpose::Outline), 3);
    }

    #[tokio::test]
    async fn test_required_step_exhaustion_fails_chapter() {
        let (generator, evaluator) = fixtures();
        for _ in 0..3 {
            generator.fail_next(
                GenerationPurpose::Outline,
                ProviderError::RateLimited("slow down".into()),
            );
        }
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        match &run.result {
            Err(PipelineError::StepFailed { step, attempts, .. }) => {
                assert_eq!(step, "generate-outline");
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(run.failed_step(), Some("generate-outline"));
        assert_eq!(step_names(&run), vec!["build-context", "generate-outline"]);
        assert!(!run.step_results[1].success);
        assert_eq!(generator.calls(GenerationPurpose::Scene), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let (generator, evaluator) = fixtures();
        generator.fail_next(
            GenerationPurpose::Outline,
            ProviderError::Authentication("bad key".into()),
        );
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        assert!(matches!(
            run.result,
            Err(PipelineError::StepFailed { attempts: 1, .. })
        ));
        assert_eq!(generator.calls(GenerationPurpose::Outline), 1);
    }

    #[tokio::test]
    async fn test_optional_step_failure_is_skipped() {
        let (generator, evaluator) = fixtures();
        evaluator.push_continuity(Err(EvaluatorError::InvalidInput("broken".into())));
        let pipeline = pipeline(generator, evaluator);
        let (ctx, chapter) = context();

        let run = pipeline
            .run(ctx, chapter, &CancellationToken::new(), &())
            .await;

        assert!(run.result.is_ok());
        let continuity = run
            .step_results
            .iter()
            .find(|r| r.step == "continuity-check")
            .unwrap();
        assert!(continuity.skipped);
        assert!(!continuity.success);
        assert_eq!(run.warnings.len(), 1);
        assert!(run.warnings[0].starts_with("continuity-check skipped"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (generator, evaluator) = fixtures();
        let pipeline = pipeline(generator, evaluator);
        let (ctx, chapter) = context();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = pipeline.run(ctx, chapter, &cancel, &()).await;

        assert!(run.is_cancelled());
        assert!(run.step_results.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_scene_generation() {
        let gate = Arc::new(Semaphore::new(0));
        let generator = Arc::new(FakeLlmClient::with_defaults().with_scene_gate(gate.clone()));
        let pipeline = pipeline(generator.clone(), Arc::new(ScriptedEvaluator::new()));
        let (ctx, chapter) = context();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(ctx, chapter, &cancel, &()).await })
        };
        while generator.calls(GenerationPurpose::Scene) == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();

        let run = task.await.unwrap();
        assert!(run.is_cancelled());
        assert!(run.step_results.iter().all(|r| r.step != "generate-scenes"));
    }

    #[tokio::test]
    async fn test_revise_rebuilds_context_then_revises() {
        let (generator, evaluator) = fixtures();
        let pipeline = pipeline(generator.clone(), evaluator);
        let (ctx, chapter) = context();
        let first = pipeline
            .run(ctx.clone(), chapter.clone(), &CancellationToken::new(), &())
            .await
            .result
            .unwrap();

        let instructions = AuthorInstructions {
            keep: vec!["the harbour setting".into()],
            change: vec!["a darker ending".into()],
            notes: None,
        };
        let run = pipeline
            .revise(
                ctx.with_instructions(instructions),
                chapter,
                &first,
                &CancellationToken::new(),
                &(),
            )
            .await;

        let revised = run.result.clone().unwrap();
        assert_ne!(revised.attempt_id, first.attempt_id);
        assert_eq!(revised.attempt_count, first.attempt_count + 1);
        assert_eq!(revised.outline, first.outline);
        assert!(revised.content.starts_with(first.content.trim()));
        assert!(revised.content.contains("Revision pass"));
        assert_eq!(step_names(&run)[..2], ["build-context", "revision"]);
        assert!(!step_names(&run).contains(&"generate-outline"));
        assert_eq!(run.step_results[1].output["applied"], true);
        assert_eq!(generator.calls(GenerationPurpose::Revision), 1);
        assert_eq!(generator.calls(GenerationPurpose::Outline), 1);

        // 修订请求携带完整的章节上下文
        let request = generator.last_request(GenerationPurpose::Revision).unwrap();
        assert!(request.system_prompt.contains("Test Book"));
        assert!(request.prompt.contains("a darker ending"));
        assert!(request.prompt.contains("quiet harbour town"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = PipelineConfig {
            retry_backoff_ms: 100,
            max_backoff_ms: 1000,
            ..PipelineConfig::default()
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(4), Duration::from_millis(1000));
        assert_eq!(config.backoff(40), Duration::from_millis(1000));
    }
}
