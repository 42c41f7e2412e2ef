//! Domain Layer - 领域层
//!
//! 包含三个限界上下文:
//! - Blueprint Context: 作者确认的全书蓝图（只读输入）
//! - Generation Context: 预算、生成产物、评估报告与统计
//! - Session Context: 全书生成会话状态机

pub mod blueprint;
pub mod generation;
pub mod session;
