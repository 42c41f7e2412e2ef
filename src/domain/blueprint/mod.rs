//! Blueprint Context - 作者审定的写作蓝图
//!
//! 职责:
//! - 全书蓝图聚合（前提、结构、角色）
//! - 章节蓝图实体（每章意图、节拍、伏笔）
//!
//! 蓝图对生成核心只读，由调用方拥有

mod aggregate;
mod entities;
mod errors;
mod value_objects;

pub use aggregate::BookBlueprint;
pub use entities::{ChapterBlueprint, CharacterProfile};
pub use errors::BlueprintError;
pub use value_objects::BlueprintId;
