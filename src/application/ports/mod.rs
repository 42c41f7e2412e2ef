//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod context_builder;
mod evaluators;
mod job_queue;
mod progress;
mod repositories;
mod session_registry;
mod text_generator;

pub use context_builder::{BuiltContext, ChapterDigest, ContextBuilderPort, ContextError, ContextRequest};
pub use evaluators::{ContinuityCheckerPort, EvaluationInput, EvaluatorError, QualityEvaluatorPort};
pub use job_queue::{GenerationQueuePort, QueueError};
pub use progress::{
    ChapterGenerationProgress, GenerationProgress, PipelineProgress, ProgressEvent,
    ProgressPublisherPort,
};
pub use repositories::{BlueprintRepositoryPort, RepositoryError, SessionRepositoryPort};
pub use session_registry::{SessionRegistryPort, SessionSlot};
pub use text_generator::{
    GenerationPurpose, GenerationRequest, GenerationResponse, ProviderError, StreamChunk,
    TextGeneratorPort, TextStream,
};
