//! Context Adapter - 基于蓝图的上下文构建

mod blueprint_context_builder;

pub use blueprint_context_builder::BlueprintContextBuilder;
