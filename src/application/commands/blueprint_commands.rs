//! Blueprint Commands

use crate::domain::blueprint::BookBlueprint;

/// 保存蓝图命令（存在则覆盖）
#[derive(Debug, Clone)]
pub struct SaveBlueprint {
    pub blueprint: BookBlueprint,
}
