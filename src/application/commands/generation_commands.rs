//! Generation Commands - 全书生成与单章生成

use crate::domain::blueprint::BookBlueprint;
use crate::domain::session::{GenerationOptions, SessionId};

/// 开始全书生成命令
#[derive(Debug, Clone)]
pub struct StartGeneration {
    pub blueprint: BookBlueprint,
    pub options: GenerationOptions,
}

/// 生成单章命令
#[derive(Debug, Clone)]
pub struct GenerateChapter {
    pub session_id: SessionId,
    pub chapter: u32,
}
