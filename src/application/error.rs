//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::ports::{QueueError, RepositoryError};
use crate::domain::blueprint::BlueprintError;
use crate::domain::generation::BudgetError;
use crate::domain::session::SessionError;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(String),

    /// 前置条件不满足（非法状态转换、章节顺序等）
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// 章节生成失败
    #[error("Chapter {chapter} failed{}: {cause}", at_step(.step))]
    ChapterFailed {
        chapter: u32,
        step: Option<String>,
        cause: String,
    },

    /// 操作被取消
    #[error("Operation cancelled")]
    Cancelled,

    /// 仓储错误
    #[error("Repository error: {0}")]
    Repository(String),

    /// 配置错误（预算不可行等）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 后台队列不可用
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

fn at_step(step: &Option<String>) -> String {
    step.as_deref()
        .map(|s| format!(" at {}", s))
        .unwrap_or_default()
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// 创建前置条件错误
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err.to_string())
    }
}

impl From<SessionError> for ApplicationError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::ChapterNotFound(n) => Self::not_found("Chapter", n),
            SessionError::InvalidRange { .. } => Self::Validation(err.to_string()),
            _ => Self::Precondition(err.to_string()),
        }
    }
}

impl From<BlueprintError> for ApplicationError {
    fn from(err: BlueprintError) -> Self {
        match err {
            BlueprintError::ChapterNotFound(n) => Self::not_found("Chapter", n),
            _ => Self::Validation(err.to_string()),
        }
    }
}

impl From<BudgetError> for ApplicationError {
    fn from(err: BudgetError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<QueueError> for ApplicationError {
    fn from(err: QueueError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_mapping() {
        assert!(matches!(
            ApplicationError::from(SessionError::ChapterNotFound(4)),
            ApplicationError::NotFound { resource_type: "Chapter", .. }
        ));
        assert!(matches!(
            ApplicationError::from(SessionError::OutOfOrder { chapter: 3, blocking: 2 }),
            ApplicationError::Precondition(_)
        ));
        assert!(matches!(
            ApplicationError::from(SessionError::InvalidRange { start: 5, end: 2, total: 9 }),
            ApplicationError::Validation(_)
        ));
    }

    #[test]
    fn test_chapter_failed_message() {
        let err = ApplicationError::ChapterFailed {
            chapter: 2,
            step: Some("generate-outline".into()),
            cause: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Chapter 2 failed at generate-outline: timeout");

        let err = ApplicationError::ChapterFailed {
            chapter: 2,
            step: None,
            cause: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Chapter 2 failed: timeout");
    }
}
