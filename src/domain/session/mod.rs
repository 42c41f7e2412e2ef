//! Session Context - 全书生成会话
//!
//! 职责:
//! - GenerationSession 状态机（暂停/恢复/取消/审批/修订）
//! - 章节状态与运行历史
//! - 可持久化快照（进程重启后可恢复）

mod aggregate;
mod errors;
mod options;
mod status;
mod value_objects;

pub use aggregate::{ChapterRecord, ChapterRun, GenerationSession, NextChapter, PauseOutcome, RunKind, RunOutcome};
pub use errors::SessionError;
pub use options::{ContextOptions, GenerationOptions};
pub use status::{ChapterStatus, SessionStatus};
pub use value_objects::SessionId;
