//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TextGenerator、ContextBuilder、Evaluator、Repository 等）
//! - pipeline: 单章生成流水线（步骤、重试、质量门修订循环）
//! - orchestrator: 全书生成会话编排
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod queries;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use commands::{
    // Blueprint commands
    SaveBlueprint,
    // Chapter commands
    ApproveChapter,
    RegenerateChapter,
    ReviseChapter,
    // Generation commands
    GenerateChapter,
    StartGeneration,
    // Session commands
    CancelSession,
    PauseSession,
    ResumeSession,
    // Handlers
    handlers::{
        ApproveChapterHandler, CancelSessionHandler, GenerateChapterHandler, PauseSessionHandler,
        RegenerateChapterHandler, ResumeSessionHandler, ReviseChapterHandler,
        SaveBlueprintHandler, StartGenerationHandler,
    },
};

pub use error::ApplicationError;

pub use orchestrator::{
    BookGenerationOrchestrator, DryRunChapter, DryRunReport, GenerationStart, OrchestratorDeps,
    ProgressReporter, RegenerateOptions,
};

pub use pipeline::{
    AuthorInstructions, ChapterGenerationPipeline, PipelineConfig, PipelineError, StepDependencies,
    StepRegistry,
};

pub use ports::{
    // Context
    BuiltContext,
    ChapterDigest,
    ContextBuilderPort,
    ContextError,
    ContextRequest,
    // Evaluators
    ContinuityCheckerPort,
    EvaluationInput,
    EvaluatorError,
    QualityEvaluatorPort,
    // Queue
    GenerationQueuePort,
    QueueError,
    // Progress
    ChapterGenerationProgress,
    GenerationProgress,
    PipelineProgress,
    ProgressEvent,
    ProgressPublisherPort,
    // Repositories
    BlueprintRepositoryPort,
    RepositoryError,
    SessionRepositoryPort,
    // Registry
    SessionRegistryPort,
    SessionSlot,
    // Text generator
    GenerationPurpose,
    GenerationRequest,
    GenerationResponse,
    ProviderError,
    StreamChunk,
    TextGeneratorPort,
    TextStream,
};

pub use queries::{
    // Blueprint queries
    GetBlueprint,
    ListBlueprints,
    // Session queries
    GetSession,
    GetStatistics,
    ListSessions,
    // Handlers
    handlers::{
        BlueprintSummary, GetBlueprintHandler, GetSessionHandler, GetStatisticsHandler,
        ListBlueprintsHandler, ListSessionsHandler, SessionSummary,
    },
};
