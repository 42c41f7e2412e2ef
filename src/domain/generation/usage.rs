//! Token Usage - 模型调用用量

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// 单次或累计的 token 用量与费用
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// 估算费用（美元）
    pub estimated_cost: f64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, estimated_cost: f64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            estimated_cost,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            estimated_cost: self.estimated_cost + rhs.estimated_cost,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}
