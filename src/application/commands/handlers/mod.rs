//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod blueprint_handlers;
mod chapter_handlers;
mod generation_handlers;
mod session_command_handlers;

pub use blueprint_handlers::*;
pub use chapter_handlers::*;
pub use generation_handlers::*;
pub use session_command_handlers::*;
