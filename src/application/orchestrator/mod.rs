//! Book Generation Orchestrator
//!
//! - service: 会话生命周期（章节循环、暂停/恢复/取消、重新生成、审批、修订）
//! - dry_run: 只校验输入与预算的试运行
//! - reporter: 流水线进度转发到会话进度通道

mod dry_run;
mod reporter;
mod service;

pub use dry_run::{DryRunChapter, DryRunReport};
pub use reporter::ProgressReporter;
pub use service::{BookGenerationOrchestrator, GenerationStart, OrchestratorDeps, RegenerateOptions};
