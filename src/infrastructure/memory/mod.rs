//! Memory Layer - In-Memory State Management
//!
//! 运行中会话的槽位、生成队列，以及不落盘的仓储实现

mod generation_queue;
mod repositories;
mod session_registry;

pub use generation_queue::ChannelGenerationQueue;
pub use repositories::{InMemoryBlueprintRepository, InMemorySessionRepository};
pub use session_registry::InMemorySessionRegistry;
