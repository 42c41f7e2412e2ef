//! Blueprint Context - Errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlueprintError {
    #[error("蓝图标题不能为空")]
    EmptyTitle,

    #[error("蓝图至少需要一个章节")]
    NoChapters,

    #[error("章节编号不连续: 期望 {expected}, 实际 {found}")]
    NonContiguousChapters { expected: u32, found: u32 },

    #[error("第 {0} 章目标字数必须大于 0")]
    InvalidTargetWords(u32),

    #[error("章节不存在: {0}")]
    ChapterNotFound(u32),
}
