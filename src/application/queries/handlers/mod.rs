//! Query Handlers 实现
//!
//! 所有 QueryHandler 的具体实现

mod blueprint_handlers;
mod session_handlers;

pub use blueprint_handlers::*;
pub use session_handlers::*;
