//! Worker Layer - Background Task Processing
//!
//! 实现 GenerationWorker，执行排队会话的章节循环

mod generation_worker;

pub use generation_worker::{GenerationWorker, GenerationWorkerConfig};
