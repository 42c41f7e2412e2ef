//! Session Queries

use crate::domain::session::SessionId;

/// 获取会话快照查询
#[derive(Debug, Clone)]
pub struct GetSession {
    pub session_id: SessionId,
}

/// 获取会话统计查询
#[derive(Debug, Clone)]
pub struct GetStatistics {
    pub session_id: SessionId,
}

/// 列出所有会话查询
#[derive(Debug, Clone)]
pub struct ListSessions;
