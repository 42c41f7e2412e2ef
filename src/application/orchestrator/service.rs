//! Book Generation Orchestrator - 会话生命周期
//!
//! 每个会话一个槽位（见 SessionSlot）：会话互斥锁串行化同一会话的修改，
//! 运行锁保证同一会话同时只有一个流水线执行。流水线运行期间不持有会话锁，
//! 暂停、取消、查询可随时进入。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::dry_run::{self, DryRunReport};
use super::reporter::ProgressReporter;
use crate::application::error::ApplicationError;
use crate::application::pipeline::{
    AuthorInstructions, ChapterGenerationContext, ChapterGenerationPipeline, GenerationParams,
    PipelineError, PipelineRun,
};
use crate::application::ports::{
    BlueprintRepositoryPort, ChapterDigest, ContextBuilderPort, GenerationProgress, ProgressEvent,
    ProgressPublisherPort, SessionRegistryPort, SessionRepositoryPort, SessionSlot,
};
use crate::domain::blueprint::BookBlueprint;
use crate::domain::generation::{
    compute_statistics, GeneratedChapter, GenerationStatistics, TokenBudgetAllocator,
};
use crate::domain::session::{
    ChapterRun, ChapterStatus, GenerationOptions, GenerationSession, PauseOutcome, RunKind,
    RunOutcome, SessionId, SessionStatus,
};

/// 传给下一章的前文末尾长度（字符）
const CLOSING_TEXT_CHARS: usize = 600;

/// 编排器依赖
pub struct OrchestratorDeps {
    pub pipeline: ChapterGenerationPipeline,
    pub context_builder: Arc<dyn ContextBuilderPort>,
    pub allocator: Arc<TokenBudgetAllocator>,
    pub context_window: usize,
    pub sessions: Arc<dyn SessionRepositoryPort>,
    pub blueprints: Arc<dyn BlueprintRepositoryPort>,
    pub registry: Arc<dyn SessionRegistryPort>,
    pub progress: Arc<dyn ProgressPublisherPort>,
}

/// 重新生成选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegenerateOptions {
    /// 需要保留的元素
    #[serde(default)]
    pub keep: Vec<String>,
    /// 需要修改的元素
    #[serde(default)]
    pub change: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// 开始生成的结果
#[derive(Debug, Clone)]
pub enum GenerationStart {
    Started(GenerationSession),
    DryRun(DryRunReport),
}

/// 单次运行的参数覆盖
#[derive(Debug, Default)]
struct RunOverrides {
    instructions: AuthorInstructions,
    model: Option<String>,
    temperature: Option<f32>,
}

/// 一次章节运行的最终结果
enum Finished {
    Chapter(GeneratedChapter),
    Failed { step: Option<String>, cause: String },
    Cancelled,
}

/// 全书生成编排器
pub struct BookGenerationOrchestrator {
    pipeline: ChapterGenerationPipeline,
    context_builder: Arc<dyn ContextBuilderPort>,
    allocator: Arc<TokenBudgetAllocator>,
    context_window: usize,
    sessions: Arc<dyn SessionRepositoryPort>,
    blueprints: Arc<dyn BlueprintRepositoryPort>,
    registry: Arc<dyn SessionRegistryPort>,
    progress: Arc<dyn ProgressPublisherPort>,
}

impl BookGenerationOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            pipeline: deps.pipeline,
            context_builder: deps.context_builder,
            allocator: deps.allocator,
            context_window: deps.context_window,
            sessions: deps.sessions,
            blueprints: deps.blueprints,
            registry: deps.registry,
            progress: deps.progress,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    // ========== 会话生命周期 ==========

    /// 创建会话并进入 Planning；章节循环由 run_session 执行
    ///
    /// 试运行只校验并返回计划，不保存会话
    pub async fn start_generation(
        &self,
        blueprint: BookBlueprint,
        options: GenerationOptions,
    ) -> Result<GenerationStart, ApplicationError> {
        blueprint.validate()?;
        let mut session = GenerationSession::new(&blueprint, options)?;
        let blueprint = Arc::new(blueprint);

        if session.options().skip_existing_chapters {
            self.import_existing(&mut session).await?;
        }

        if session.options().dry_run {
            let report = dry_run::plan(
                &self.context_builder,
                &self.allocator,
                self.context_window,
                &blueprint,
                &session,
            )
            .await?;
            return Ok(GenerationStart::DryRun(report));
        }

        // 预算在开始前校验，避免每章都失败在 build-context
        self.allocator.allocate(self.context_window)?;

        session.begin_planning()?;
        self.blueprints.save(&blueprint).await?;
        self.sessions.save(&session).await?;
        self.registry
            .insert(Arc::new(SessionSlot::new(session.clone(), blueprint.clone())));
        self.publish_status(&session);

        tracing::info!(
            session_id = %session.id(),
            book = %blueprint.title,
            range = ?session.chapter_range(),
            require_approval = session.options().require_approval,
            "Generation session started"
        );
        Ok(GenerationStart::Started(session))
    }

    /// 执行章节循环，直到完成、暂停、等待审批、失败或取消
    ///
    /// 同一会话已有流水线在运行时排队等待，轮到后按当时的状态继续
    pub async fn run_session(&self, id: &SessionId) -> Result<GenerationSession, ApplicationError> {
        let slot = self.slot(id).await?;
        let _running = slot.run().await;

        loop {
            let (number, chapter, context) = {
                let mut session = slot.lock().await;
                if !matches!(
                    session.status(),
                    SessionStatus::Planning | SessionStatus::GeneratingChapter(_)
                ) {
                    break;
                }
                let SessionStatus::GeneratingChapter(number) = session.advance()? else {
                    self.sessions.save(&session).await?;
                    break;
                };

                let chapter = slot.blueprint().chapter(number)?.clone();
                session.start_chapter(number)?;
                self.sessions.save(&session).await?;
                let context =
                    self.chapter_context(&session, slot.blueprint(), number, RunOverrides::default());
                self.publish_status(&session);
                self.publish_started(&session, slot.blueprint(), number, RunKind::Initial);
                (number, chapter, context)
            };

            let reporter =
                ProgressReporter::new(self.progress.clone(), *id, number, RunKind::Initial);
            let started_at = Utc::now();
            let run = self
                .pipeline
                .run(context, chapter, slot.cancellation(), &reporter)
                .await;

            let mut session = slot.lock().await;
            match self
                .finish_run(&mut session, number, RunKind::Initial, run, started_at, true)
                .await?
            {
                Finished::Chapter(_) => continue,
                Finished::Failed { .. } | Finished::Cancelled => break,
            }
        }

        let session = slot.lock().await.clone();
        self.publish_status(&session);
        if session.status().is_terminal() {
            self.progress.close(id);
        }
        tracing::info!(
            session_id = %id,
            status = %session.status(),
            "Generation loop stopped"
        );
        Ok(session)
    }

    /// 暂停：在章节边界生效；没有运行中的章节时立即生效
    pub async fn pause(&self, id: &SessionId) -> Result<GenerationSession, ApplicationError> {
        let slot = self.slot(id).await?;
        let mut session = slot.lock().await;
        match session.request_pause() {
            PauseOutcome::Requested => {
                if !slot.is_running() {
                    session.pause_now();
                }
                self.sessions.save(&session).await?;
                self.publish_status(&session);
                tracing::info!(
                    session_id = %id,
                    status = %session.status(),
                    "Pause requested"
                );
            }
            PauseOutcome::AlreadyPaused | PauseOutcome::AlreadyTerminal => {
                tracing::debug!(session_id = %id, status = %session.status(), "Pause ignored");
            }
        }
        Ok(session.clone())
    }

    /// Paused / Failed → 下一个待处理章节
    pub async fn resume(&self, id: &SessionId) -> Result<GenerationSession, ApplicationError> {
        let slot = self.slot(id).await?;
        let mut session = slot.lock().await;
        let status = session.resume()?;
        self.sessions.save(&session).await?;
        self.publish_status(&session);
        tracing::info!(session_id = %id, status = %status, "Session resumed");
        Ok(session.clone())
    }

    /// 取消会话；运行中的章节在下一个检查点放弃
    pub async fn cancel(&self, id: &SessionId) -> Result<GenerationSession, ApplicationError> {
        let slot = self.slot(id).await?;
        let mut session = slot.lock().await;
        if session.cancel()? {
            slot.cancellation().cancel();
            self.sessions.save(&session).await?;
            self.publish_status(&session);
            tracing::info!(session_id = %id, "Session cancelled");
        }
        if !slot.is_running() {
            self.progress.close(id);
        }
        Ok(session.clone())
    }

    // ========== 单章操作 ==========

    /// 生成单章（前一章必须已定稿或跳过）
    pub async fn generate_single_chapter(
        &self,
        id: &SessionId,
        number: u32,
    ) -> Result<GeneratedChapter, ApplicationError> {
        self.run_single(id, number, RunKind::Initial, RunOverrides::default())
            .await
    }

    /// 重新生成章节，替换之前的结果；每次请求都是独立的新尝试
    pub async fn regenerate_chapter(
        &self,
        id: &SessionId,
        number: u32,
        options: RegenerateOptions,
    ) -> Result<GeneratedChapter, ApplicationError> {
        let overrides = RunOverrides {
            instructions: AuthorInstructions {
                keep: options.keep,
                change: options.change,
                notes: options.notes,
            },
            model: options.model,
            temperature: options.temperature,
        };
        self.run_single(id, number, RunKind::Regeneration, overrides)
            .await
    }

    /// 按作者指令修订章节，从修订步骤重新进入质量门循环
    pub async fn request_revision(
        &self,
        id: &SessionId,
        number: u32,
        instructions: AuthorInstructions,
    ) -> Result<GeneratedChapter, ApplicationError> {
        if instructions.is_empty() {
            return Err(ApplicationError::validation("revision instructions are empty"));
        }
        let overrides = RunOverrides {
            instructions,
            ..Default::default()
        };
        self.run_single(id, number, RunKind::Revision, overrides)
            .await
    }

    /// AwaitingApproval → Approved；其他状态返回前置条件错误且不修改会话
    pub async fn approve_chapter(
        &self,
        id: &SessionId,
        number: u32,
    ) -> Result<GenerationSession, ApplicationError> {
        let slot = self.slot(id).await?;
        let mut session = slot.lock().await;
        let status = session.approve(number)?;
        self.sessions.save(&session).await?;
        self.publish_status(&session);
        tracing::info!(session_id = %id, chapter = number, status = %status, "Chapter approved");
        if status.is_terminal() && !slot.is_running() {
            self.progress.close(id);
        }
        Ok(session.clone())
    }

    // ========== 查询 ==========

    pub async fn get_session(&self, id: &SessionId) -> Result<GenerationSession, ApplicationError> {
        if let Some(slot) = self.registry.get(id) {
            return Ok(slot.lock().await.clone());
        }
        self.sessions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Session", id))
    }

    pub async fn get_statistics(
        &self,
        id: &SessionId,
    ) -> Result<GenerationStatistics, ApplicationError> {
        let session = self.get_session(id).await?;
        Ok(compute_statistics(&session))
    }

    /// 所有会话快照（按创建时间倒序）
    pub async fn list_sessions(&self) -> Result<Vec<GenerationSession>, ApplicationError> {
        Ok(self.sessions.find_all().await?)
    }

    /// 启动时恢复未结束的会话：进行中的会话转为 Paused
    pub async fn restore_sessions(&self) -> Result<usize, ApplicationError> {
        let mut restored = 0;
        for mut session in self.sessions.find_all().await? {
            if session.status().is_terminal() || self.registry.get(session.id()).is_some() {
                continue;
            }
            if session.recover_after_restart() {
                self.sessions.save(&session).await?;
            }
            let Some(blueprint) = self.blueprints.find_by_id(session.blueprint_id()).await? else {
                tracing::warn!(
                    session_id = %session.id(),
                    blueprint_id = %session.blueprint_id(),
                    "Blueprint missing, session not restored"
                );
                continue;
            };
            tracing::info!(
                session_id = %session.id(),
                status = %session.status(),
                "Session restored"
            );
            self.registry
                .insert(Arc::new(SessionSlot::new(session, Arc::new(blueprint))));
            restored += 1;
        }
        Ok(restored)
    }

    // ========== 内部 ==========

    /// 获取会话槽位，不在内存中时从仓储加载
    async fn slot(&self, id: &SessionId) -> Result<Arc<SessionSlot>, ApplicationError> {
        if let Some(slot) = self.registry.get(id) {
            return Ok(slot);
        }
        let session = self
            .sessions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Session", id))?;
        let blueprint = self
            .blueprints
            .find_by_id(session.blueprint_id())
            .await?
            .ok_or_else(|| ApplicationError::not_found("Blueprint", session.blueprint_id()))?;

        // 并发加载时以先注册的槽位为准
        if let Some(slot) = self.registry.get(id) {
            return Ok(slot);
        }
        let slot = Arc::new(SessionSlot::new(session, Arc::new(blueprint)));
        self.registry.insert(slot.clone());
        Ok(slot)
    }

    /// 导入同一蓝图最近一次会话中已定稿的章节
    async fn import_existing(&self, session: &mut GenerationSession) -> Result<(), ApplicationError> {
        let Some(previous) = self
            .sessions
            .find_latest_for_blueprint(session.blueprint_id(), session.id())
            .await?
        else {
            return Ok(());
        };
        let range = session.chapter_range();
        let imported: Vec<u32> = previous
            .chapters()
            .iter()
            .filter(|record| range.contains(&record.number))
            .filter(|record| session.import_chapter(record))
            .map(|record| record.number)
            .collect();
        tracing::info!(
            session_id = %session.id(),
            source = %previous.id(),
            chapters = ?imported,
            "Imported existing chapters"
        );
        Ok(())
    }

    async fn run_single(
        &self,
        id: &SessionId,
        number: u32,
        kind: RunKind,
        overrides: RunOverrides,
    ) -> Result<GeneratedChapter, ApplicationError> {
        let slot = self.slot(id).await?;
        let chapter = slot.blueprint().chapter(number)?.clone();
        // 章节状态在拿到运行锁之后检查，排队的请求看到的是前一次运行的结果
        let _running = slot.run().await;

        let (context, previous) = {
            let mut session = slot.lock().await;
            session.begin_run(number, kind)?;
            let previous = match kind {
                RunKind::Revision => session.chapter(number).and_then(|c| c.chapter.clone()),
                _ => None,
            };
            self.sessions.save(&session).await?;
            let context = self.chapter_context(&session, slot.blueprint(), number, overrides);
            self.publish_status(&session);
            self.publish_started(&session, slot.blueprint(), number, kind);
            (context, previous)
        };

        let reporter = ProgressReporter::new(self.progress.clone(), *id, number, kind);
        let started_at = Utc::now();
        let run = match &previous {
            Some(previous) => {
                self.pipeline
                    .revise(context, chapter, previous, slot.cancellation(), &reporter)
                    .await
            }
            None => {
                self.pipeline
                    .run(context, chapter, slot.cancellation(), &reporter)
                    .await
            }
        };

        let mut session = slot.lock().await;
        let finished = self
            .finish_run(&mut session, number, kind, run, started_at, false)
            .await?;
        self.publish_status(&session);
        match finished {
            Finished::Chapter(chapter) => Ok(chapter),
            Finished::Failed { step, cause } => Err(ApplicationError::ChapterFailed {
                chapter: number,
                step,
                cause,
            }),
            Finished::Cancelled => Err(ApplicationError::Cancelled),
        }
    }

    /// 把流水线结果写回会话并保存
    ///
    /// 章节循环中的失败使会话进入 Failed；单章操作的失败不改变会话状态
    async fn finish_run(
        &self,
        session: &mut GenerationSession,
        number: u32,
        kind: RunKind,
        run: PipelineRun,
        started_at: DateTime<Utc>,
        in_loop: bool,
    ) -> Result<Finished, ApplicationError> {
        let id = *session.id();
        if run.is_cancelled() || session.status() == SessionStatus::Cancelled {
            session.abandon_chapter(number)?;
            self.sessions.save(session).await?;
            tracing::info!(session_id = %id, chapter = number, "Chapter run abandoned");
            return Ok(Finished::Cancelled);
        }

        let failed_step = run.failed_step().map(str::to_string);
        let PipelineRun {
            result,
            step_results,
            warnings,
            tokens,
            elapsed_ms,
        } = run;

        match result {
            Ok(chapter) => {
                let outcome = if chapter.requires_manual_review {
                    RunOutcome::NeedsReview
                } else {
                    RunOutcome::Completed
                };
                let record = ChapterRun {
                    kind,
                    outcome,
                    step_results,
                    error: None,
                    started_at,
                    finished_at: Utc::now(),
                };
                session.complete_chapter(number, chapter.clone(), record)?;
                self.sessions.save(session).await?;

                let status = session
                    .chapter(number)
                    .map(|c| c.status)
                    .unwrap_or(ChapterStatus::Completed);
                self.progress.publish(
                    &id,
                    ProgressEvent::ChapterFinished {
                        session_id: id,
                        chapter: number,
                        status,
                        word_count: chapter.word_count,
                        requires_manual_review: chapter.requires_manual_review,
                    },
                );
                tracing::info!(
                    session_id = %id,
                    chapter = number,
                    words = chapter.word_count,
                    attempts = chapter.attempt_count,
                    tokens = tokens.total_tokens(),
                    elapsed_ms,
                    warnings = warnings.len(),
                    review = chapter.requires_manual_review,
                    "Chapter finished"
                );
                Ok(Finished::Chapter(chapter))
            }
            Err(err) => {
                let cause = match &err {
                    PipelineError::StepFailed { cause, .. } => cause.clone(),
                    other => other.to_string(),
                };
                let record = ChapterRun {
                    kind,
                    outcome: RunOutcome::Failed,
                    step_results,
                    error: Some(err.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                };
                if in_loop {
                    session.fail_chapter(number, record, err.to_string())?;
                } else {
                    session.fail_run(number, record, err.to_string())?;
                }
                self.sessions.save(session).await?;

                self.progress.publish(
                    &id,
                    ProgressEvent::ChapterFailed {
                        session_id: id,
                        chapter: number,
                        step: failed_step.clone(),
                        error: err.to_string(),
                    },
                );
                tracing::error!(
                    session_id = %id,
                    chapter = number,
                    step = ?failed_step,
                    error = %err,
                    "Chapter failed"
                );
                Ok(Finished::Failed {
                    step: failed_step,
                    cause,
                })
            }
        }
    }

    fn chapter_context(
        &self,
        session: &GenerationSession,
        blueprint: &Arc<BookBlueprint>,
        number: u32,
        overrides: RunOverrides,
    ) -> ChapterGenerationContext {
        let previous = session
            .prior_chapters(number)
            .map(|c| ChapterDigest {
                number: c.number,
                title: c.title.clone(),
                summary: c.summary.clone(),
                closing_text: closing_text(&c.content).to_string(),
            })
            .collect();

        let options = session.options();
        let defaults = GenerationParams::default();
        let params = GenerationParams {
            model: overrides.model.or_else(|| options.model.clone()),
            temperature: overrides
                .temperature
                .or(options.temperature)
                .unwrap_or(defaults.temperature),
        };

        ChapterGenerationContext::new(blueprint.clone(), previous)
            .with_options(options.context.clone())
            .with_params(params)
            .with_instructions(overrides.instructions)
    }

    fn publish_status(&self, session: &GenerationSession) {
        let range = session.chapter_range();
        let in_range: Vec<_> = session
            .chapters()
            .iter()
            .filter(|c| range.contains(&c.number))
            .collect();
        let finished = in_range.iter().filter(|c| c.status.unblocks_next()).count();
        let total = in_range.len();
        let percent = if total == 0 {
            0.0
        } else {
            finished as f32 / total as f32 * 100.0
        };

        self.progress.publish(
            session.id(),
            ProgressEvent::Generation(GenerationProgress {
                session_id: *session.id(),
                status: session.status(),
                current_chapter: session.status().chapter(),
                finished_chapters: finished,
                total_chapters: total,
                percent,
            }),
        );
    }

    fn publish_started(
        &self,
        session: &GenerationSession,
        blueprint: &BookBlueprint,
        number: u32,
        run: RunKind,
    ) {
        let title = blueprint
            .chapter(number)
            .map(|c| c.title.clone())
            .unwrap_or_default();
        tracing::info!(
            session_id = %session.id(),
            chapter = number,
            run = ?run,
            "Chapter started"
        );
        self.progress.publish(
            session.id(),
            ProgressEvent::ChapterStarted {
                session_id: *session.id(),
                chapter: number,
                title,
                run,
            },
        );
    }
}

fn closing_text(content: &str) -> &str {
    let count = content.chars().count();
    if count <= CLOSING_TEXT_CHARS {
        return content;
    }
    match content.char_indices().nth(count - CLOSING_TEXT_CHARS) {
        Some((idx, _)) => &content[idx..],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{GenerationPurpose, ProviderError};
    use crate::application::test_support::{self, ScriptedEvaluator};
    use crate::infrastructure::adapters::{BlueprintContextBuilder, FakeLlmClient};
    use crate::infrastructure::events::ProgressPublisher;
    use crate::infrastructure::memory::{
        InMemoryBlueprintRepository, InMemorySessionRegistry, InMemorySessionRepository,
    };
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::Semaphore;

    struct Harness {
        orchestrator: Arc<BookGenerationOrchestrator>,
        generator: Arc<FakeLlmClient>,
        evaluator: Arc<ScriptedEvaluator>,
        sessions: Arc<InMemorySessionRepository>,
        blueprints: Arc<InMemoryBlueprintRepository>,
        progress: Arc<ProgressPublisher>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_generator(FakeLlmClient::with_defaults())
        }

        fn with_generator(generator: FakeLlmClient) -> Self {
            Self::assemble(
                Arc::new(generator),
                Arc::new(ScriptedEvaluator::new()),
                InMemorySessionRepository::new().arc(),
                InMemoryBlueprintRepository::new().arc(),
            )
        }

        /// 共享仓储、全新注册表，模拟进程重启
        fn restarted(&self) -> Self {
            Self::assemble(
                self.generator.clone(),
                self.evaluator.clone(),
                self.sessions.clone(),
                self.blueprints.clone(),
            )
        }

        fn assemble(
            generator: Arc<FakeLlmClient>,
            evaluator: Arc<ScriptedEvaluator>,
            sessions: Arc<InMemorySessionRepository>,
            blueprints: Arc<InMemoryBlueprintRepository>,
        ) -> Self {
            let progress = ProgressPublisher::new(4096).arc();
            let orchestrator = BookGenerationOrchestrator::new(OrchestratorDeps {
                pipeline: test_support::pipeline(generator.clone(), evaluator.clone()),
                context_builder: Arc::new(BlueprintContextBuilder::new()),
                allocator: test_support::allocator(),
                context_window: 8000,
                sessions: sessions.clone(),
                blueprints: blueprints.clone(),
                registry: InMemorySessionRegistry::new().arc(),
                progress: progress.clone(),
            })
            .arc();
            Self {
                orchestrator,
                generator,
                evaluator,
                sessions,
                blueprints,
                progress,
            }
        }

        async fn start(&self, blueprint: BookBlueprint, options: GenerationOptions) -> SessionId {
            match self
                .orchestrator
                .start_generation(blueprint, options)
                .await
                .unwrap()
            {
                GenerationStart::Started(session) => *session.id(),
                GenerationStart::DryRun(_) => panic!("unexpected dry run"),
            }
        }

        async fn completed(&self, blueprint: BookBlueprint) -> GenerationSession {
            let id = self.start(blueprint, GenerationOptions::default()).await;
            let session = self.orchestrator.run_session(&id).await.unwrap();
            assert_eq!(session.status(), SessionStatus::Completed);
            session
        }
    }

    fn content(session: &GenerationSession, number: u32) -> GeneratedChapter {
        session.chapter(number).unwrap().chapter.clone().unwrap()
    }

    async fn wait_for_scene_call(generator: &FakeLlmClient) {
        while generator.calls(GenerationPurpose::Scene) == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_generates_requested_range_in_order() {
        let h = Harness::new();
        let id = h
            .start(
                test_support::blueprint(5),
                GenerationOptions {
                    start_from_chapter: Some(3),
                    end_at_chapter: Some(5),
                    ..Default::default()
                },
            )
            .await;
        let mut rx = h.progress.subscribe(&id);

        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Pending);
        assert_eq!(session.chapter(2).unwrap().status, ChapterStatus::Pending);
        for n in 3..=5 {
            let record = session.chapter(n).unwrap();
            assert_eq!(record.status, ChapterStatus::Completed);
            assert_eq!(record.runs.len(), 1);
        }

        let mut finished = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(ProgressEvent::ChapterFinished { chapter, .. }) => finished.push(chapter),
                Ok(_) => {}
                Err(TryRecvError::Closed) => break,
                Err(other) => panic!("unexpected receive error: {:?}", other),
            }
        }
        assert_eq!(finished, vec![3, 4, 5]);
        assert_eq!(h.progress.channel_count(), 0);

        let stored = h.sessions.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn test_invalid_range_rejected() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .start_generation(
                test_support::blueprint(3),
                GenerationOptions {
                    start_from_chapter: Some(3),
                    end_at_chapter: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Validation(_)));
        assert!(h.orchestrator.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let h = Harness::new();
        let start = h
            .orchestrator
            .start_generation(
                test_support::blueprint(3),
                GenerationOptions {
                    dry_run: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let GenerationStart::DryRun(report) = start else {
            panic!("expected a dry run report");
        };
        assert_eq!(report.chapters.len(), 3);
        assert_eq!(report.context_window, 8000);
        assert!(report.estimated_prompt_tokens > 0);
        assert!(h.orchestrator.list_sessions().await.unwrap().is_empty());
        assert!(h.blueprints.find_all().await.unwrap().is_empty());
        assert_eq!(h.generator.calls(GenerationPurpose::Outline), 0);
        assert_eq!(h.generator.calls(GenerationPurpose::Scene), 0);
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let h = Harness::new();
        let id = h
            .start(
                test_support::blueprint(2),
                GenerationOptions {
                    require_approval: true,
                    ..Default::default()
                },
            )
            .await;

        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::AwaitingApproval(1));
        assert_eq!(
            session.chapter(1).unwrap().status,
            ChapterStatus::AwaitingApproval
        );
        assert_eq!(session.chapter(2).unwrap().status, ChapterStatus::Pending);

        // 第 2 章尚未生成，审批失败且会话不变
        let before = h.orchestrator.get_session(&id).await.unwrap();
        let err = h.orchestrator.approve_chapter(&id, 2).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Precondition(_)));
        assert_eq!(h.orchestrator.get_session(&id).await.unwrap(), before);

        let session = h.orchestrator.approve_chapter(&id, 1).await.unwrap();
        assert_eq!(session.status(), SessionStatus::GeneratingChapter(2));
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Approved);

        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::AwaitingApproval(2));

        let session = h.orchestrator.approve_chapter(&id, 2).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_revision_requests_are_distinct_attempts() {
        let h = Harness::new();
        let session = h.completed(test_support::blueprint(2)).await;
        let id = *session.id();
        let original = content(&session, 1);

        let instructions = AuthorInstructions {
            keep: vec!["the harbour".into()],
            change: vec![],
            notes: Some("Sharpen the final image".into()),
        };
        let first = h
            .orchestrator
            .request_revision(&id, 1, instructions.clone())
            .await
            .unwrap();
        let second = h
            .orchestrator
            .request_revision(&id, 1, instructions)
            .await
            .unwrap();

        assert_ne!(first.attempt_id, original.attempt_id);
        assert_ne!(second.attempt_id, first.attempt_id);
        assert_eq!(first.attempt_count, original.attempt_count + 1);
        assert_eq!(second.attempt_count, first.attempt_count + 1);
        assert!(first.content.starts_with(original.content.trim()));

        let session = h.orchestrator.get_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(content(&session, 1), second);
        assert_eq!(session.chapter(1).unwrap().runs.len(), 3);
        assert!(session
            .chapter(1)
            .unwrap()
            .runs
            .iter()
            .skip(1)
            .all(|r| r.kind == RunKind::Revision));
    }

    #[tokio::test]
    async fn test_concurrent_revisions_are_serialized() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::with_generator(
            FakeLlmClient::with_defaults().with_gate(GenerationPurpose::Revision, gate.clone()),
        );
        let session = h.completed(test_support::blueprint(1)).await;
        let id = *session.id();
        let original = content(&session, 1);
        let instructions = AuthorInstructions {
            keep: vec![],
            change: vec!["a colder dawn".into()],
            notes: None,
        };

        let first = {
            let orchestrator = h.orchestrator.clone();
            let instructions = instructions.clone();
            tokio::spawn(async move { orchestrator.request_revision(&id, 1, instructions).await })
        };
        while h.generator.calls(GenerationPurpose::Revision) == 0 {
            tokio::task::yield_now().await;
        }
        let session = h.orchestrator.get_session(&id).await.unwrap();
        assert_eq!(
            session.chapter(1).unwrap().status,
            ChapterStatus::RevisionRequested
        );

        // 第二个请求排队等待，而不是被拒绝
        let second = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.request_revision(&id, 1, instructions).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        assert_eq!(h.generator.calls(GenerationPurpose::Revision), 1);

        gate.add_permits(10);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_ne!(first.attempt_id, original.attempt_id);
        assert_ne!(second.attempt_id, first.attempt_id);
        assert_eq!(second.attempt_count, first.attempt_count + 1);

        let session = h.orchestrator.get_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(content(&session, 1), second);
        assert_eq!(session.chapter(1).unwrap().runs.len(), 3);
    }

    #[tokio::test]
    async fn test_resume_during_regeneration_continues_after_it() {
        let gate = Arc::new(Semaphore::new(100));
        let h = Harness::with_generator(FakeLlmClient::with_defaults().with_scene_gate(gate.clone()));
        let id = h
            .start(test_support::blueprint(3), GenerationOptions::default())
            .await;
        let session = h.orchestrator.pause(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        h.orchestrator.generate_single_chapter(&id, 1).await.unwrap();

        // 关闭闸门，让重新生成停在场景步骤
        let remaining = gate.available_permits() as u32;
        gate.try_acquire_many(remaining).unwrap().forget();
        let scenes = h.generator.calls(GenerationPurpose::Scene);
        let regeneration = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .regenerate_chapter(&id, 1, RegenerateOptions::default())
                    .await
            })
        };
        while h.generator.calls(GenerationPurpose::Scene) == scenes {
            tokio::task::yield_now().await;
        }

        let session = h.orchestrator.resume(&id).await.unwrap();
        assert!(matches!(session.status(), SessionStatus::GeneratingChapter(_)));

        // worker 投递的循环等到重新生成结束后继续
        let runner = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_session(&id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!runner.is_finished());

        gate.add_permits(100);
        let regenerated = regeneration.await.unwrap().unwrap();
        let session = runner.await.unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(content(&session, 1), regenerated);
        for n in 1..=3 {
            assert_eq!(session.chapter(n).unwrap().status, ChapterStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_empty_revision_rejected() {
        let h = Harness::new();
        let session = h.completed(test_support::blueprint(1)).await;
        let err = h
            .orchestrator
            .request_revision(session.id(), 1, AuthorInstructions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_pause_takes_effect_at_chapter_boundary() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::with_generator(FakeLlmClient::with_defaults().with_scene_gate(gate.clone()));
        let id = h
            .start(test_support::blueprint(3), GenerationOptions::default())
            .await;

        let task = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_session(&id).await })
        };
        wait_for_scene_call(&h.generator).await;

        // 重复投递的循环在运行锁上排队
        let queued = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_session(&id).await })
        };

        let session = h.orchestrator.pause(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::GeneratingChapter(1));
        assert!(session.pause_requested());

        gate.add_permits(100);
        let session = task.await.unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        let session = queued.await.unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        assert_eq!(session.chapter(2).unwrap().status, ChapterStatus::Pending);
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Completed);
        assert_eq!(session.chapter(2).unwrap().status, ChapterStatus::Pending);

        let session = h.orchestrator.resume(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::GeneratingChapter(2));
        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_pause_without_running_chapter_is_immediate() {
        let h = Harness::new();
        let id = h
            .start(test_support::blueprint(2), GenerationOptions::default())
            .await;

        let session = h.orchestrator.pause(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);

        // 已暂停时再次暂停不报错
        let again = h.orchestrator.pause(&id).await.unwrap();
        assert_eq!(again.status(), SessionStatus::Paused);

        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        assert_eq!(h.generator.calls(GenerationPurpose::Outline), 0);
    }

    #[tokio::test]
    async fn test_cancel_abandons_running_chapter() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::with_generator(FakeLlmClient::with_defaults().with_scene_gate(gate.clone()));
        let id = h
            .start(test_support::blueprint(3), GenerationOptions::default())
            .await;
        let mut rx = h.progress.subscribe(&id);

        let task = {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_session(&id).await })
        };
        wait_for_scene_call(&h.generator).await;

        let session = h.orchestrator.cancel(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Cancelled);

        let session = task.await.unwrap().unwrap();
        assert_eq!(session.status(), SessionStatus::Cancelled);
        let record = session.chapter(1).unwrap();
        assert_eq!(record.status, ChapterStatus::Pending);
        assert!(record.runs.is_empty());
        assert!(record.chapter.is_none());

        let mut finished = 0;
        loop {
            match rx.try_recv() {
                Ok(ProgressEvent::ChapterFinished { .. }) => finished += 1,
                Ok(_) => {}
                Err(TryRecvError::Closed) => break,
                Err(other) => panic!("unexpected receive error: {:?}", other),
            }
        }
        assert_eq!(finished, 0);

        let err = h.orchestrator.resume(&id).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_failed_chapter_can_be_resumed() {
        let h = Harness::new();
        h.generator.fail_next(
            GenerationPurpose::Outline,
            ProviderError::Authentication("bad key".into()),
        );
        let id = h
            .start(test_support::blueprint(2), GenerationOptions::default())
            .await;

        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Failed);
        let record = session.chapter(1).unwrap();
        assert_eq!(record.status, ChapterStatus::Failed);
        assert_eq!(record.runs.len(), 1);
        assert_eq!(record.runs[0].outcome, RunOutcome::Failed);
        assert!(session.last_error().unwrap().contains("generate-outline"));

        let session = h.orchestrator.resume(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::GeneratingChapter(1));
        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.chapter(1).unwrap().runs.len(), 2);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_skip_existing_imports_finalized_chapters() {
        let h = Harness::new();
        let blueprint = test_support::blueprint(3);
        let first = h.completed(blueprint.clone()).await;
        let outline_calls = h.generator.calls(GenerationPurpose::Outline);

        let id = h
            .start(
                blueprint,
                GenerationOptions {
                    skip_existing_chapters: true,
                    ..Default::default()
                },
            )
            .await;
        let session = h.orchestrator.get_session(&id).await.unwrap();
        for n in 1..=3 {
            let record = session.chapter(n).unwrap();
            assert_eq!(record.status, ChapterStatus::Skipped);
            assert!(record.imported);
            assert_eq!(content(&session, n), content(&first, n));
        }

        let session = h.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(h.generator.calls(GenerationPurpose::Outline), outline_calls);
    }

    #[tokio::test]
    async fn test_regenerate_keeps_other_chapters() {
        let h = Harness::new();
        let session = h.completed(test_support::blueprint(3)).await;
        let id = *session.id();

        let regenerated = h
            .orchestrator
            .regenerate_chapter(
                &id,
                2,
                RegenerateOptions {
                    change: vec!["the weather".into()],
                    temperature: Some(0.4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_ne!(regenerated.attempt_id, content(&session, 2).attempt_id);

        let after = h.orchestrator.get_session(&id).await.unwrap();
        assert_eq!(content(&after, 1), content(&session, 1));
        assert_eq!(content(&after, 3), content(&session, 3));
        assert_eq!(content(&after, 2), regenerated);
        assert_eq!(after.chapter(2).unwrap().runs[1].kind, RunKind::Regeneration);
    }

    #[tokio::test]
    async fn test_single_chapter_requires_previous_chapter() {
        let h = Harness::new();
        let id = h
            .start(test_support::blueprint(3), GenerationOptions::default())
            .await;

        let err = h
            .orchestrator
            .generate_single_chapter(&id, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Precondition(_)));

        let err = h
            .orchestrator
            .generate_single_chapter(&id, 9)
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));

        let chapter = h.orchestrator.generate_single_chapter(&id, 1).await.unwrap();
        assert_eq!(chapter.number, 1);
        let session = h.orchestrator.get_session(&id).await.unwrap();
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Completed);

        h.orchestrator.generate_single_chapter(&id, 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_pauses_interrupted_sessions() {
        let h = Harness::new();
        let id = h
            .start(test_support::blueprint(2), GenerationOptions::default())
            .await;

        // 模拟第 1 章生成中进程退出
        let mut interrupted = h.sessions.find_by_id(&id).await.unwrap().unwrap();
        interrupted.advance().unwrap();
        interrupted.start_chapter(1).unwrap();
        h.sessions.save(&interrupted).await.unwrap();

        let restarted = h.restarted();
        assert_eq!(restarted.orchestrator.restore_sessions().await.unwrap(), 1);

        let session = restarted.orchestrator.get_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        assert_eq!(session.chapter(1).unwrap().status, ChapterStatus::Pending);
        assert_eq!(
            h.sessions.find_by_id(&id).await.unwrap().unwrap().status(),
            SessionStatus::Paused
        );

        restarted.orchestrator.resume(&id).await.unwrap();
        let session = restarted.orchestrator.run_session(&id).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_statistics_are_repeatable() {
        let h = Harness::new();
        let session = h.completed(test_support::blueprint(2)).await;

        let first = h.orchestrator.get_statistics(session.id()).await.unwrap();
        let second = h.orchestrator.get_statistics(session.id()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.completed_chapters, 2);
        assert!(first.total_words > 0);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .get_session(&SessionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { resource_type: "Session", .. }));
    }

    #[test]
    fn test_closing_text_keeps_tail() {
        let text = "x".repeat(CLOSING_TEXT_CHARS + 10) + "end";
        let tail = closing_text(&text);
        assert_eq!(tail.chars().count(), CLOSING_TEXT_CHARS);
        assert!(tail.ends_with("end"));
        assert_eq!(closing_text("short"), "short");
    }
}
