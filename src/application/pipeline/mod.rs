//! Chapter Generation Pipeline
//!
//! - state: 单次运行的共享状态
//! - step: 步骤抽象、策略、注册表
//! - steps: 九个标准步骤
//! - driver: 顺序执行、重试、质量门修订循环

mod driver;
mod prompts;
mod state;
mod step;
mod steps;

pub use driver::{ChapterGenerationPipeline, PipelineConfig, PipelineError, PipelineRun};
pub use state::{AuthorInstructions, ChapterGenerationContext, GenerationParams, PipelineState};
pub use step::{
    PipelineObserver, PipelineStep, StepContext, StepError, StepKind, StepPolicy, StepRegistry,
};
pub use steps::{
    AssembleChapterStep, BuildContextStep, ContinuityCheckStep, FinalizeStep, GenerateOutlineStep,
    GenerateScenesStep, QualityEvaluationStep, RevisionStep, StepDependencies, StyleCheckStep,
};
