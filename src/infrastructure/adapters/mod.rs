//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod context;
pub mod evaluators;
pub mod llm;

pub use context::*;
pub use evaluators::*;
pub use llm::*;
