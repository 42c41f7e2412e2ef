//! Session Context - Errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("会话状态 {status} 不允许操作 {action}")]
    InvalidTransition { status: String, action: &'static str },

    #[error("章节不存在: {0}")]
    ChapterNotFound(u32),

    #[error("第 {chapter} 章状态为 {status}，期望 {expected}")]
    ChapterState {
        chapter: u32,
        status: String,
        expected: &'static str,
    },

    #[error("第 {chapter} 章必须在第 {blocking} 章定稿后才能生成")]
    OutOfOrder { chapter: u32, blocking: u32 },

    #[error("无效的章节范围: {start}..={end}（共 {total} 章）")]
    InvalidRange { start: u32, end: u32, total: u32 },
}
