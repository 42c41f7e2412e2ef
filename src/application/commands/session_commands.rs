//! Session Commands - 会话控制命令

use crate::domain::session::SessionId;

/// 暂停会话命令（在章节边界生效）
#[derive(Debug, Clone)]
pub struct PauseSession {
    pub session_id: SessionId,
}

/// 恢复会话命令
#[derive(Debug, Clone)]
pub struct ResumeSession {
    pub session_id: SessionId,
}

/// 取消会话命令
#[derive(Debug, Clone)]
pub struct CancelSession {
    pub session_id: SessionId,
}
