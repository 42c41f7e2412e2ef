//! Step Result - 单个流水线步骤的执行记录
//!
//! 创建后不可变，按执行顺序追加

use serde::{Deserialize, Serialize};

use super::TokenUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 步骤名称（如 "generate-outline"）
    pub step: String,
    /// 步骤在流水线中的固定顺序
    pub order: u32,
    /// 所在修订轮次（0 为首轮）
    pub iteration: u32,
    pub success: bool,
    /// 非必需步骤失败后被跳过
    pub skipped: bool,
    pub execution_ms: u64,
    pub retry_count: u32,
    pub tokens: TokenUsage,
    pub error: Option<String>,
    pub output: serde_json::Value,
}

impl StepResult {
    /// 排序键：(修订轮次, 步骤顺序)
    pub fn sequence_key(&self) -> (u32, u32) {
        (self.iteration, self.order)
    }
}
