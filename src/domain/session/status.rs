//! Session Context - 状态定义

use serde::{Deserialize, Serialize};

/// 会话状态
///
/// NotStarted → Planning → GeneratingChapter(n) → {AwaitingApproval(n) | RevisionRequested(n)}
/// → GeneratingChapter(n+1) → … → Completed
///
/// Paused 只在章节边界进入；Cancelled / Failed 可从任意非终止状态进入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "chapter", rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Planning,
    GeneratingChapter(u32),
    AwaitingApproval(u32),
    RevisionRequested(u32),
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::Planning => "planning",
            SessionStatus::GeneratingChapter(_) => "generating_chapter",
            SessionStatus::AwaitingApproval(_) => "awaiting_approval",
            SessionStatus::RevisionRequested(_) => "revision_requested",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }

    pub fn chapter(&self) -> Option<u32> {
        match self {
            SessionStatus::GeneratingChapter(n)
            | SessionStatus::AwaitingApproval(n)
            | SessionStatus::RevisionRequested(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chapter() {
            Some(n) => write!(f, "{}({})", self.as_str(), n),
            None => f.write_str(self.as_str()),
        }
    }
}

/// 章节状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    Generating,
    AwaitingApproval,
    RevisionRequested,
    Approved,
    Completed,
    Failed,
    Skipped,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Generating => "generating",
            ChapterStatus::AwaitingApproval => "awaiting_approval",
            ChapterStatus::RevisionRequested => "revision_requested",
            ChapterStatus::Approved => "approved",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Failed => "failed",
            ChapterStatus::Skipped => "skipped",
        }
    }

    /// 已定稿
    pub fn is_finalized(&self) -> bool {
        matches!(self, ChapterStatus::Approved | ChapterStatus::Completed)
    }

    /// 后续章节可以开始
    pub fn unblocks_next(&self) -> bool {
        self.is_finalized() || *self == ChapterStatus::Skipped
    }

    /// 已有生成内容的状态
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            ChapterStatus::AwaitingApproval
                | ChapterStatus::RevisionRequested
                | ChapterStatus::Approved
                | ChapterStatus::Completed
        )
    }
}

impl std::fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SessionStatus::GeneratingChapter(3)).unwrap();
        assert_eq!(json, r#"{"state":"generating_chapter","chapter":3}"#);
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionStatus::GeneratingChapter(3));

        let json = serde_json::to_string(&SessionStatus::Paused).unwrap();
        assert_eq!(json, r#"{"state":"paused"}"#);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
        assert!(!SessionStatus::AwaitingApproval(2).is_terminal());
    }
}
