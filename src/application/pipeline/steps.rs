//! Pipeline Steps - 九个标准步骤

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::prompts;
use super::{PipelineState, PipelineStep, StepContext, StepError, StepKind, StepRegistry};
use crate::application::ports::{
    BuiltContext, ContextBuilderPort, ContextRequest, ContinuityCheckerPort, EvaluationInput,
    GenerationPurpose, GenerationRequest, QualityEvaluatorPort, StreamChunk, TextGeneratorPort,
};
use crate::domain::generation::{
    count_words, estimate_tokens, GeneratedChapter, GeneratedScene, TokenBudgetAllocator,
};

const OUTLINE_MAX_TOKENS: usize = 1024;
const SUMMARY_MAX_CHARS: usize = 600;
const SCENE_TAIL_CHARS: usize = 400;

/// 标准步骤依赖的协作者
#[derive(Clone)]
pub struct StepDependencies {
    pub generator: Arc<dyn TextGeneratorPort>,
    pub context_builder: Arc<dyn ContextBuilderPort>,
    pub quality: Arc<dyn QualityEvaluatorPort>,
    pub continuity: Arc<dyn ContinuityCheckerPort>,
    pub allocator: Arc<TokenBudgetAllocator>,
    /// 模型上下文窗口（token）
    pub context_window: usize,
}

impl StepRegistry {
    /// 注册全部九个标准步骤
    pub fn standard(deps: &StepDependencies) -> Self {
        let mut registry = StepRegistry::new();
        registry.register(Arc::new(BuildContextStep {
            builder: deps.context_builder.clone(),
            allocator: deps.allocator.clone(),
            context_window: deps.context_window,
        }));
        registry.register(Arc::new(GenerateOutlineStep {
            generator: deps.generator.clone(),
        }));
        registry.register(Arc::new(GenerateScenesStep {
            generator: deps.generator.clone(),
        }));
        registry.register(Arc::new(RevisionStep {
            generator: deps.generator.clone(),
        }));
        registry.register(Arc::new(AssembleChapterStep));
        registry.register(Arc::new(ContinuityCheckStep {
            checker: deps.continuity.clone(),
        }));
        registry.register(Arc::new(StyleCheckStep {
            evaluator: deps.quality.clone(),
        }));
        registry.register(Arc::new(QualityEvaluationStep {
            evaluator: deps.quality.clone(),
        }));
        registry.register(Arc::new(FinalizeStep));
        registry
    }
}

fn to_u32(tokens: usize) -> u32 {
    u32::try_from(tokens).unwrap_or(u32::MAX).max(1)
}

fn request(
    state: &PipelineState,
    purpose: GenerationPurpose,
    system_prompt: String,
    prompt: String,
    max_output_tokens: usize,
) -> GenerationRequest {
    GenerationRequest {
        purpose,
        system_prompt,
        prompt,
        model: state.context.params.model.clone(),
        temperature: state.context.params.temperature,
        max_output_tokens: to_u32(max_output_tokens),
    }
}

fn evaluation_input(state: &PipelineState, content: String) -> EvaluationInput {
    EvaluationInput {
        blueprint: state.context.blueprint.clone(),
        chapter: state.chapter.number,
        content,
        previous: state.context.previous.clone(),
    }
}

// ============================================================================
// build-context
// ============================================================================

/// 测量上下文、分配预算并在预算内组装上下文
pub struct BuildContextStep {
    builder: Arc<dyn ContextBuilderPort>,
    allocator: Arc<TokenBudgetAllocator>,
    context_window: usize,
}

#[async_trait]
impl PipelineStep for BuildContextStep {
    fn kind(&self) -> StepKind {
        StepKind::BuildContext
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let request = ContextRequest {
            blueprint: state.context.blueprint.clone(),
            chapter: state.chapter.number,
            previous: state.context.previous.clone(),
            options: state.context.options.clone(),
        };

        let measured = self.builder.measure(&request).await?;
        let budget = self
            .allocator
            .allocate_with_measurements(self.context_window, &measured)
            .map_err(|e| StepError::Fatal(e.to_string()))?;
        let built = self.builder.build(&request, &budget).await?;

        let output = json!({
            "estimated_tokens": built.estimated_tokens,
            "allocated": budget.allocated(),
            "total": budget.total,
            "previous_chapters": request.previous.len(),
        });
        state.context.budget = Some(budget);
        state.context.assembled = Some(built);
        Ok(output)
    }
}

// ============================================================================
// generate-outline
// ============================================================================

pub struct GenerateOutlineStep {
    generator: Arc<dyn TextGeneratorPort>,
}

#[async_trait]
impl PipelineStep for GenerateOutlineStep {
    fn kind(&self) -> StepKind {
        StepKind::GenerateOutline
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let (Some(assembled), Some(budget)) = (&state.context.assembled, &state.context.budget)
        else {
            return Err(StepError::MissingInput {
                step: StepKind::GenerateOutline.name(),
                missing: "assembled context",
            });
        };

        let prompt = prompts::outline_prompt(
            assembled,
            &state.chapter,
            &state.context.instructions.to_lines(),
        );
        let request = request(
            state,
            GenerationPurpose::Outline,
            assembled.system_prompt.clone(),
            prompt,
            budget.output_tokens().min(OUTLINE_MAX_TOKENS),
        );

        let response = self.generator.generate(request).await?;
        state.record_usage(response.usage, &response.model);

        let outline = prompts::parse_outline(&response.text);
        if outline.is_empty() {
            return Err(StepError::Transient("model returned an empty outline".into()));
        }

        state.outline = outline;
        state.scenes.clear();
        Ok(json!({ "beats": state.outline }))
    }
}

// ============================================================================
// generate-scenes
// ============================================================================

/// 每个大纲节拍一次流式调用；重试时从第一个未完成的场景继续
pub struct GenerateScenesStep {
    generator: Arc<dyn TextGeneratorPort>,
}

#[async_trait]
impl PipelineStep for GenerateScenesStep {
    fn kind(&self) -> StepKind {
        StepKind::GenerateScenes
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        if state.outline.is_empty() {
            return Err(StepError::MissingInput {
                step: StepKind::GenerateScenes.name(),
                missing: "outline",
            });
        }
        let (Some(assembled), Some(budget)) =
            (state.context.assembled.clone(), state.context.budget.clone())
        else {
            return Err(StepError::MissingInput {
                step: StepKind::GenerateScenes.name(),
                missing: "assembled context",
            });
        };

        let total = state.outline.len();
        if state.scenes.len() > total {
            state.scenes.clear();
        }
        let per_scene_tokens = (budget.output_tokens() / total).max(256);
        let instructions = state.context.instructions.to_lines();

        for index in state.scenes.len()..total {
            let previous_tail = state
                .scenes
                .last()
                .map(|s| prompts::tail(&s.content, SCENE_TAIL_CHARS).to_string());
            let prompt = prompts::scene_prompt(
                &assembled,
                &state.chapter,
                &state.outline,
                index,
                previous_tail.as_deref(),
                &instructions,
            );
            let request = request(
                state,
                GenerationPurpose::Scene,
                assembled.system_prompt.clone(),
                prompt,
                per_scene_tokens,
            );

            let words_before: usize = state.scenes.iter().map(|s| s.word_count).sum();
            let step_percent = index as f32 / total as f32 * 100.0;
            let mut stream = self.generator.generate_stream(request).await?;
            let mut text = String::new();

            while let Some(chunk) = stream.next().await {
                if ctx.is_cancelled() {
                    return Err(StepError::Cancelled);
                }
                match chunk? {
                    StreamChunk::Delta(delta) => {
                        text.push_str(&delta);
                        ctx.report(step_percent, Some(delta), words_before + count_words(&text));
                    }
                    StreamChunk::Done { usage, model } => state.record_usage(usage, &model),
                }
            }

            let text = text.trim();
            if text.is_empty() {
                return Err(StepError::Transient(format!(
                    "model returned an empty scene {}",
                    index + 1
                )));
            }
            let beat = state.outline[index].clone();
            state.scenes.push(GeneratedScene::new(index, beat, text));

            let words: usize = state.scenes.iter().map(|s| s.word_count).sum();
            ctx.report((index + 1) as f32 / total as f32 * 100.0, None, words);
        }

        Ok(json!({
            "scenes": state.scenes.len(),
            "words": state.scenes.iter().map(|s| s.word_count).sum::<usize>(),
        }))
    }
}

// ============================================================================
// revision
// ============================================================================

/// 没有待处理的问题或作者指令时为空操作
pub struct RevisionStep {
    generator: Arc<dyn TextGeneratorPort>,
}

#[async_trait]
impl PipelineStep for RevisionStep {
    fn kind(&self) -> StepKind {
        StepKind::Revision
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let mut instructions = state.revision_instructions.clone();
        instructions.extend(state.blocking_issues().into_iter().map(|issue| {
            match issue.suggestion {
                Some(s) => format!(
                    "[{}] {}: {} ({})",
                    issue.severity, issue.category, issue.message, s
                ),
                None => format!("[{}] {}: {}", issue.severity, issue.category, issue.message),
            }
        }));
        if instructions.is_empty() {
            return Ok(json!({ "applied": false }));
        }

        let Some(text) = state.current_text().map(str::to_string) else {
            return Err(StepError::MissingInput {
                step: StepKind::Revision.name(),
                missing: "draft text",
            });
        };

        let assembled = state.context.assembled.clone().unwrap_or_else(BuiltContext::default);
        let max_tokens = match &state.context.budget {
            Some(budget) => budget.output_tokens(),
            None => (estimate_tokens(&text) * 3 / 2).max(OUTLINE_MAX_TOKENS),
        };
        let prompt = prompts::revision_prompt(&assembled, &state.chapter, &text, &instructions);
        let request = request(
            state,
            GenerationPurpose::Revision,
            assembled.system_prompt.clone(),
            prompt,
            max_tokens,
        );

        let response = self.generator.generate(request).await?;
        state.record_usage(response.usage, &response.model);

        let revised = response.text.trim();
        if revised.is_empty() {
            return Err(StepError::Transient("model returned an empty revision".into()));
        }

        state.revised_content = Some(revised.to_string());
        state.revision_instructions.clear();
        state.revisions_applied += 1;
        Ok(json!({
            "applied": true,
            "instructions": instructions,
            "words": count_words(revised),
        }))
    }
}

// ============================================================================
// assemble-chapter
// ============================================================================

/// 拼接场景或采用修订稿；新正文使旧的评估报告失效
pub struct AssembleChapterStep;

#[async_trait]
impl PipelineStep for AssembleChapterStep {
    fn kind(&self) -> StepKind {
        StepKind::AssembleChapter
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let (content, source) = match &state.revised_content {
            Some(revised) => (revised.clone(), "revision"),
            None if !state.scenes.is_empty() => (
                state
                    .scenes
                    .iter()
                    .map(|s| s.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                "scenes",
            ),
            None => {
                return Err(StepError::MissingInput {
                    step: StepKind::AssembleChapter.name(),
                    missing: "scenes",
                })
            }
        };
        if content.trim().is_empty() {
            return Err(StepError::Fatal("assembled chapter is empty".into()));
        }

        let words = count_words(&content);
        state.content = Some(content);
        state.clear_reports();
        Ok(json!({ "words": words, "source": source }))
    }
}

// ============================================================================
// checks
// ============================================================================

fn assembled_content(state: &PipelineState, kind: StepKind) -> Result<String, StepError> {
    state.content.clone().ok_or(StepError::MissingInput {
        step: kind.name(),
        missing: "assembled chapter",
    })
}

fn report_output(report: &crate::domain::generation::EvaluationReport) -> serde_json::Value {
    json!({
        "passed": report.passed,
        "score": report.score,
        "issues": report.issues.len(),
    })
}

pub struct ContinuityCheckStep {
    checker: Arc<dyn ContinuityCheckerPort>,
}

#[async_trait]
impl PipelineStep for ContinuityCheckStep {
    fn kind(&self) -> StepKind {
        StepKind::ContinuityCheck
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let content = assembled_content(state, self.kind())?;
        let report = self.checker.check(&evaluation_input(state, content)).await?;
        let output = report_output(&report);
        state.continuity_report = Some(report);
        Ok(output)
    }
}

pub struct StyleCheckStep {
    evaluator: Arc<dyn QualityEvaluatorPort>,
}

#[async_trait]
impl PipelineStep for StyleCheckStep {
    fn kind(&self) -> StepKind {
        StepKind::StyleCheck
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let content = assembled_content(state, self.kind())?;
        let report = self
            .evaluator
            .evaluate_style(&evaluation_input(state, content))
            .await?;
        let output = report_output(&report);
        state.style_report = Some(report);
        Ok(output)
    }
}

pub struct QualityEvaluationStep {
    evaluator: Arc<dyn QualityEvaluatorPort>,
}

#[async_trait]
impl PipelineStep for QualityEvaluationStep {
    fn kind(&self) -> StepKind {
        StepKind::QualityEvaluation
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let content = assembled_content(state, self.kind())?;
        let report = self
            .evaluator
            .evaluate(&evaluation_input(state, content))
            .await?;
        let output = report_output(&report);
        state.quality_report = Some(report);
        Ok(output)
    }
}

// ============================================================================
// finalize
// ============================================================================

pub struct FinalizeStep;

#[async_trait]
impl PipelineStep for FinalizeStep {
    fn kind(&self) -> StepKind {
        StepKind::Finalize
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        _ctx: &StepContext<'_>,
    ) -> Result<serde_json::Value, StepError> {
        let content = assembled_content(state, self.kind())?;
        let model = state
            .model_used
            .clone()
            .or_else(|| state.context.params.model.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let chapter = GeneratedChapter {
            attempt_id: Uuid::new_v4(),
            number: state.chapter.number,
            title: state.chapter.title.clone(),
            word_count: count_words(&content),
            content,
            scenes: state.scenes.clone(),
            outline: state.outline.clone(),
            summary: prompts::summarize(&state.chapter.title, &state.outline, SUMMARY_MAX_CHARS),
            quality_score: state.quality_report.as_ref().and_then(|r| r.score),
            attempt_count: state.attempt_count(),
            revision_iterations: state.iteration,
            requires_manual_review: state.requires_manual_review,
            unresolved_issues: state.blocking_issues(),
            model,
            generated_at: chrono::Utc::now(),
        };

        let output = json!({
            "words": chapter.word_count,
            "attempt_count": chapter.attempt_count,
            "requires_manual_review": chapter.requires_manual_review,
            "unresolved_issues": chapter.unresolved_issues.len(),
        });
        state.final_chapter = Some(chapter);
        Ok(output)
    }
}
