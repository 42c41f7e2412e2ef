//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：处理所有写操作

mod blueprint_commands;
mod chapter_commands;
mod generation_commands;
mod session_commands;

pub mod handlers;

pub use blueprint_commands::*;
pub use chapter_commands::*;
pub use generation_commands::*;
pub use session_commands::*;
