//! Chapter Commands - 章节级作者操作

use crate::application::orchestrator::RegenerateOptions;
use crate::application::pipeline::AuthorInstructions;
use crate::domain::session::SessionId;

/// 重新生成章节命令
#[derive(Debug, Clone)]
pub struct RegenerateChapter {
    pub session_id: SessionId,
    pub chapter: u32,
    pub options: RegenerateOptions,
}

/// 审批章节命令
#[derive(Debug, Clone)]
pub struct ApproveChapter {
    pub session_id: SessionId,
    pub chapter: u32,
}

/// 修订章节命令
#[derive(Debug, Clone)]
pub struct ReviseChapter {
    pub session_id: SessionId,
    pub chapter: u32,
    pub instructions: AuthorInstructions,
}
