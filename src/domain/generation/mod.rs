//! Generation Context - 生成过程的领域模型
//!
//! 职责:
//! - Token 预算划分
//! - 生成产物（章节、场景）
//! - 评估报告（质量、文风、连贯性）
//! - 步骤执行记录与统计

mod budget;
mod chapter;
mod report;
mod statistics;
mod step_result;
mod usage;

pub use budget::{
    estimate_tokens, BudgetError, BudgetSection, BudgetWeights, SectionSizes, TokenBudget,
    TokenBudgetAllocator,
};
pub use chapter::{count_words, GeneratedChapter, GeneratedScene};
pub use report::{EvaluationIssue, EvaluationReport, ReportKind, Severity};
pub use statistics::{compute_statistics, ChapterStatistics, GenerationStatistics};
pub use step_result::StepResult;
pub use usage::TokenUsage;
