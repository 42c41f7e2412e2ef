//! Session Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChapterStatus, GenerationOptions, SessionError, SessionId, SessionStatus};
use crate::domain::blueprint::{BlueprintId, BookBlueprint};
use crate::domain::generation::{GeneratedChapter, StepResult, TokenUsage};

/// 章节运行类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Initial,
    Regeneration,
    Revision,
}

/// 章节运行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// 修订轮数耗尽，需要人工审阅
    NeedsReview,
    Failed,
}

/// 单次章节运行记录（被取消的运行不会保留）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRun {
    pub kind: RunKind,
    pub outcome: RunOutcome,
    pub step_results: Vec<StepResult>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ChapterRun {
    pub fn tokens(&self) -> TokenUsage {
        self.step_results
            .iter()
            .fold(TokenUsage::default(), |acc, r| acc + r.tokens)
    }

    pub fn execution_ms(&self) -> u64 {
        self.step_results.iter().map(|r| r.execution_ms).sum()
    }
}

/// 会话中的章节记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub number: u32,
    pub title: String,
    pub status: ChapterStatus,
    pub chapter: Option<GeneratedChapter>,
    #[serde(default)]
    pub runs: Vec<ChapterRun>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// 从之前的会话导入
    #[serde(default)]
    pub imported: bool,
    /// 运行开始前的状态，运行被放弃时恢复
    #[serde(default)]
    previous_status: Option<ChapterStatus>,
}

impl ChapterRecord {
    pub fn new(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            status: ChapterStatus::Pending,
            chapter: None,
            runs: Vec::new(),
            last_error: None,
            imported: false,
            previous_status: None,
        }
    }

    fn state_error(&self, expected: &'static str) -> SessionError {
        SessionError::ChapterState {
            chapter: self.number,
            status: self.status.to_string(),
            expected,
        }
    }

    fn restore(&mut self) {
        self.status = self.previous_status.take().unwrap_or(ChapterStatus::Pending);
    }
}

/// 下一步要处理的章节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextChapter {
    Generate(u32),
    AwaitApproval(u32),
    Done,
}

/// 暂停请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    /// 已记录，将在章节边界生效
    Requested,
    AlreadyPaused,
    AlreadyTerminal,
}

/// GenerationSession 聚合根
///
/// 不变量:
/// - 章节严格按顺序生成：第 n 章定稿（或跳过）前不开始第 n+1 章
/// - 暂停只在章节边界生效
/// - 终止状态（Completed / Cancelled）不再接受生成操作；Failed 只能通过 resume 退出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSession {
    id: SessionId,
    blueprint_id: BlueprintId,
    book_title: String,
    options: GenerationOptions,
    status: SessionStatus,
    first_chapter: u32,
    last_chapter: u32,
    chapters: Vec<ChapterRecord>,
    pause_requested: bool,
    cancel_requested: bool,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl GenerationSession {
    /// 为蓝图创建新会话，所有章节初始为 Pending
    pub fn new(blueprint: &BookBlueprint, options: GenerationOptions) -> Result<Self, SessionError> {
        let total = blueprint.chapter_count();
        let first = options.start_from_chapter.unwrap_or(1);
        let last = options.end_at_chapter.unwrap_or(total);
        if first == 0 || first > last || last > total {
            return Err(SessionError::InvalidRange {
                start: first,
                end: last,
                total,
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: SessionId::new(),
            blueprint_id: blueprint.id,
            book_title: blueprint.title.clone(),
            options,
            status: SessionStatus::NotStarted,
            first_chapter: first,
            last_chapter: last,
            chapters: blueprint
                .chapters
                .iter()
                .map(|c| ChapterRecord::new(c.number, c.title.clone()))
                .collect(),
            pause_requested: false,
            cancel_requested: false,
            last_error: None,
            created_at: now,
            last_activity: now,
        })
    }

    // Getters
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn blueprint_id(&self) -> &BlueprintId {
        &self.blueprint_id
    }

    pub fn book_title(&self) -> &str {
        &self.book_title
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn chapter_range(&self) -> std::ops::RangeInclusive<u32> {
        self.first_chapter..=self.last_chapter
    }

    pub fn chapters(&self) -> &[ChapterRecord] {
        &self.chapters
    }

    pub fn chapter(&self, number: u32) -> Option<&ChapterRecord> {
        self.chapters.iter().find(|c| c.number == number)
    }

    pub fn pause_requested(&self) -> bool {
        self.pause_requested
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// 已定稿或跳过章节的摘要（按章节顺序，早于 `before`）
    pub fn prior_chapters(&self, before: u32) -> impl Iterator<Item = &GeneratedChapter> {
        self.chapters
            .iter()
            .filter(move |c| c.number < before && c.status.unblocks_next())
            .filter_map(|c| c.chapter.as_ref())
    }

    /// 计算范围内下一个需要处理的章节
    pub fn next_chapter(&self) -> NextChapter {
        for record in self.in_range() {
            match record.status {
                ChapterStatus::Approved | ChapterStatus::Completed | ChapterStatus::Skipped => {
                    continue
                }
                ChapterStatus::AwaitingApproval | ChapterStatus::RevisionRequested => {
                    return NextChapter::AwaitApproval(record.number)
                }
                ChapterStatus::Pending | ChapterStatus::Failed | ChapterStatus::Generating => {
                    return NextChapter::Generate(record.number)
                }
            }
        }
        NextChapter::Done
    }

    // ========== 生命周期 ==========

    /// NotStarted → Planning
    pub fn begin_planning(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::NotStarted {
            return Err(self.transition_error("begin_planning"));
        }
        self.status = SessionStatus::Planning;
        self.touch();
        Ok(())
    }

    /// 导入之前会话中已定稿的章节，标记为 Skipped
    pub fn import_chapter(&mut self, source: &ChapterRecord) -> bool {
        if !source.status.is_finalized() {
            return false;
        }
        let Some(chapter) = source.chapter.clone() else {
            return false;
        };
        let Some(record) = self.record_mut(source.number) else {
            return false;
        };
        if record.status != ChapterStatus::Pending {
            return false;
        }
        record.status = ChapterStatus::Skipped;
        record.chapter = Some(chapter);
        record.imported = true;
        self.touch();
        true
    }

    /// 在章节边界推进会话：决定下一章、等待审批、暂停或完成
    pub fn advance(&mut self) -> Result<SessionStatus, SessionError> {
        if !matches!(
            self.status,
            SessionStatus::Planning | SessionStatus::GeneratingChapter(_)
        ) {
            return Err(self.transition_error("advance"));
        }
        self.settle();
        Ok(self.status)
    }

    /// 章节循环开始第 n 章
    pub fn start_chapter(&mut self, number: u32) -> Result<(), SessionError> {
        if !matches!(
            self.status,
            SessionStatus::Planning | SessionStatus::GeneratingChapter(_)
        ) {
            return Err(self.transition_error("start_chapter"));
        }
        self.check_sequence(number)?;
        let record = self.existing_mut(number)?;
        if !matches!(record.status, ChapterStatus::Pending | ChapterStatus::Failed) {
            return Err(record.state_error("pending or failed"));
        }
        record.previous_status = Some(record.status);
        record.status = ChapterStatus::Generating;
        self.status = SessionStatus::GeneratingChapter(number);
        self.touch();
        Ok(())
    }

    /// 单章操作（单章生成、重新生成、修订）开始
    pub fn begin_run(&mut self, number: u32, kind: RunKind) -> Result<(), SessionError> {
        if matches!(self.status, SessionStatus::Cancelled | SessionStatus::NotStarted) {
            return Err(self.transition_error("begin_run"));
        }
        if kind == RunKind::Initial {
            self.check_sequence(number)?;
        }

        let record = self.existing_mut(number)?;
        let allowed = match kind {
            RunKind::Initial => {
                matches!(record.status, ChapterStatus::Pending | ChapterStatus::Failed)
            }
            RunKind::Regeneration => {
                record.status.has_content()
                    || matches!(record.status, ChapterStatus::Failed | ChapterStatus::Skipped)
            }
            RunKind::Revision => {
                record.chapter.is_some()
                    && (record.status.has_content() || record.status == ChapterStatus::Skipped)
            }
        };
        if !allowed {
            let expected = match kind {
                RunKind::Initial => "pending or failed",
                RunKind::Regeneration => "generated, skipped or failed",
                RunKind::Revision => "generated",
            };
            return Err(record.state_error(expected));
        }

        record.previous_status = Some(record.status);
        record.status = match kind {
            RunKind::Revision => ChapterStatus::RevisionRequested,
            _ => ChapterStatus::Generating,
        };
        if kind == RunKind::Revision && self.status == SessionStatus::AwaitingApproval(number) {
            self.status = SessionStatus::RevisionRequested(number);
        }
        self.touch();
        Ok(())
    }

    /// 章节运行成功（循环与单章操作共用）
    pub fn complete_chapter(
        &mut self,
        number: u32,
        chapter: GeneratedChapter,
        run: ChapterRun,
    ) -> Result<(), SessionError> {
        let require_approval = self.options.require_approval;
        let record = self.existing_mut(number)?;
        if !matches!(
            record.status,
            ChapterStatus::Generating | ChapterStatus::RevisionRequested
        ) {
            return Err(record.state_error("generating"));
        }
        record.status = if require_approval {
            ChapterStatus::AwaitingApproval
        } else {
            ChapterStatus::Completed
        };
        record.chapter = Some(chapter);
        record.runs.push(run);
        record.last_error = None;
        record.imported = false;
        record.previous_status = None;

        if matches!(
            self.status,
            SessionStatus::AwaitingApproval(n) | SessionStatus::RevisionRequested(n) if n == number
        ) {
            self.settle();
        }
        self.touch();
        Ok(())
    }

    /// 章节循环中的章节失败：会话进入 Failed（已取消则保持 Cancelled）
    pub fn fail_chapter(
        &mut self,
        number: u32,
        run: ChapterRun,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        let reason = reason.into();
        let record = self.existing_mut(number)?;
        record.status = ChapterStatus::Failed;
        record.previous_status = None;
        record.last_error = Some(reason.clone());
        record.runs.push(run);

        if self.status != SessionStatus::Cancelled {
            self.status = SessionStatus::Failed;
        }
        self.pause_requested = false;
        self.last_error = Some(reason);
        self.touch();
        Ok(())
    }

    /// 单章操作失败：已有内容的章节保留原状态，会话状态不变
    pub fn fail_run(
        &mut self,
        number: u32,
        run: ChapterRun,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        let reason = reason.into();
        let record = self.existing_mut(number)?;
        if record.chapter.is_some() {
            record.restore();
        } else {
            record.previous_status = None;
            record.status = ChapterStatus::Failed;
        }
        record.last_error = Some(reason.clone());
        record.runs.push(run);

        if self.status == SessionStatus::RevisionRequested(number) {
            self.status = SessionStatus::AwaitingApproval(number);
        }
        self.last_error = Some(reason);
        self.touch();
        Ok(())
    }

    /// 放弃被取消的运行：丢弃部分结果，恢复运行前状态
    pub fn abandon_chapter(&mut self, number: u32) -> Result<(), SessionError> {
        let record = self.existing_mut(number)?;
        if matches!(
            record.status,
            ChapterStatus::Generating | ChapterStatus::RevisionRequested
        ) {
            record.restore();
        }
        if self.status == SessionStatus::RevisionRequested(number) {
            self.status = SessionStatus::AwaitingApproval(number);
        }
        self.touch();
        Ok(())
    }

    // ========== 会话控制 ==========

    /// 请求暂停；实际暂停发生在章节边界
    pub fn request_pause(&mut self) -> PauseOutcome {
        if self.status == SessionStatus::Paused {
            return PauseOutcome::AlreadyPaused;
        }
        if self.status.is_terminal() {
            return PauseOutcome::AlreadyTerminal;
        }
        self.pause_requested = true;
        self.touch();
        PauseOutcome::Requested
    }

    /// 没有运行中的章节时立即暂停
    pub fn pause_now(&mut self) -> bool {
        if !matches!(
            self.status,
            SessionStatus::NotStarted | SessionStatus::Planning | SessionStatus::GeneratingChapter(_)
        ) {
            return false;
        }
        if self.chapters.iter().any(|c| c.status == ChapterStatus::Generating) {
            return false;
        }
        self.status = SessionStatus::Paused;
        self.pause_requested = false;
        self.touch();
        true
    }

    /// Paused / Failed → 下一个待处理章节
    ///
    /// 章节循环运行中且已请求暂停时，撤销该请求
    pub fn resume(&mut self) -> Result<SessionStatus, SessionError> {
        if self.pause_requested
            && matches!(
                self.status,
                SessionStatus::Planning | SessionStatus::GeneratingChapter(_)
            )
        {
            self.pause_requested = false;
            self.touch();
            return Ok(self.status);
        }
        if !matches!(self.status, SessionStatus::Paused | SessionStatus::Failed) {
            return Err(self.transition_error("resume"));
        }
        self.pause_requested = false;
        self.last_error = None;
        self.settle();
        self.touch();
        Ok(self.status)
    }

    /// 取消会话；已取消时返回 false
    pub fn cancel(&mut self) -> Result<bool, SessionError> {
        match self.status {
            SessionStatus::Cancelled => Ok(false),
            SessionStatus::Completed | SessionStatus::Failed => {
                Err(self.transition_error("cancel"))
            }
            _ => {
                self.status = SessionStatus::Cancelled;
                self.cancel_requested = true;
                self.pause_requested = false;
                self.touch();
                Ok(true)
            }
        }
    }

    /// AwaitingApproval → Approved；其他状态返回错误且不做任何修改
    pub fn approve(&mut self, number: u32) -> Result<SessionStatus, SessionError> {
        if self.status == SessionStatus::Cancelled {
            return Err(self.transition_error("approve"));
        }
        let record = self.existing_mut(number)?;
        if record.status != ChapterStatus::AwaitingApproval {
            return Err(record.state_error("awaiting_approval"));
        }
        record.status = ChapterStatus::Approved;

        if self.status == SessionStatus::AwaitingApproval(number) {
            self.settle();
        }
        self.touch();
        Ok(self.status)
    }

    /// 进程重启后恢复：进行中的会话转为 Paused，进行中的章节恢复运行前状态
    pub fn recover_after_restart(&mut self) -> bool {
        let mut changed = false;
        for record in &mut self.chapters {
            if matches!(
                record.status,
                ChapterStatus::Generating | ChapterStatus::RevisionRequested
            ) && (record.previous_status.is_some() || record.status == ChapterStatus::Generating)
            {
                record.restore();
                changed = true;
            }
        }
        match self.status {
            SessionStatus::Planning | SessionStatus::GeneratingChapter(_) => {
                self.status = SessionStatus::Paused;
                self.pause_requested = false;
                changed = true;
            }
            SessionStatus::RevisionRequested(n) => {
                self.status = SessionStatus::AwaitingApproval(n);
                changed = true;
            }
            _ => {}
        }
        if changed {
            self.touch();
        }
        changed
    }

    // ========== 内部 ==========

    fn in_range(&self) -> impl Iterator<Item = &ChapterRecord> {
        let range = self.chapter_range();
        self.chapters.iter().filter(move |c| range.contains(&c.number))
    }

    /// 按下一章节重新计算会话状态
    fn settle(&mut self) {
        self.status = match self.next_chapter() {
            NextChapter::Generate(_) if self.pause_requested => {
                self.pause_requested = false;
                SessionStatus::Paused
            }
            NextChapter::Generate(n) => SessionStatus::GeneratingChapter(n),
            NextChapter::AwaitApproval(n) => match self.chapter(n).map(|c| c.status) {
                Some(ChapterStatus::RevisionRequested) => SessionStatus::RevisionRequested(n),
                _ => SessionStatus::AwaitingApproval(n),
            },
            NextChapter::Done => SessionStatus::Completed,
        };
    }

    /// 第 n 章只能在前一章定稿或跳过后开始（全书第一章与范围起点除外）
    fn check_sequence(&self, number: u32) -> Result<(), SessionError> {
        self.existing(number)?;
        if number <= 1 || number <= self.first_chapter {
            return Ok(());
        }
        match self.chapter(number - 1) {
            Some(prev) if !prev.status.unblocks_next() => Err(SessionError::OutOfOrder {
                chapter: number,
                blocking: number - 1,
            }),
            _ => Ok(()),
        }
    }

    fn existing(&self, number: u32) -> Result<&ChapterRecord, SessionError> {
        self.chapter(number)
            .ok_or(SessionError::ChapterNotFound(number))
    }

    fn existing_mut(&mut self, number: u32) -> Result<&mut ChapterRecord, SessionError> {
        self.record_mut(number)
            .ok_or(SessionError::ChapterNotFound(number))
    }

    fn record_mut(&mut self, number: u32) -> Option<&mut ChapterRecord> {
        self.chapters.iter_mut().find(|c| c.number == number)
    }

    fn transition_error(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            status: self.status.to_string(),
            action,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}
