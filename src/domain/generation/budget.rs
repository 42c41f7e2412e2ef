//! Token Budget - 上下文窗口预算划分
//!
//! 将模型可用的上下文窗口按权重划分为各个命名子预算，
//! 预留的输出空间（reserved headroom）最先扣除。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 预算分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetSection {
    SystemPrompt,
    Narrative,
    Character,
    World,
    Plot,
    Style,
    ChapterInstructions,
}

impl BudgetSection {
    /// 声明顺序，同权重时按此顺序决定余数归属
    pub const ALL: [BudgetSection; 7] = [
        BudgetSection::SystemPrompt,
        BudgetSection::Narrative,
        BudgetSection::Character,
        BudgetSection::World,
        BudgetSection::Plot,
        BudgetSection::Style,
        BudgetSection::ChapterInstructions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetSection::SystemPrompt => "system_prompt",
            BudgetSection::Narrative => "narrative",
            BudgetSection::Character => "character",
            BudgetSection::World => "world",
            BudgetSection::Plot => "plot",
            BudgetSection::Style => "style",
            BudgetSection::ChapterInstructions => "chapter_instructions",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// 预算错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("Insufficient token budget: {available} available, at least {required} required")]
    InsufficientTokens { available: usize, required: usize },

    #[error("All budget section weights are zero")]
    NoWeightedSections,
}

/// 各分区权重
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetWeights {
    #[serde(default)]
    pub system_prompt: u32,
    #[serde(default)]
    pub narrative: u32,
    #[serde(default)]
    pub character: u32,
    #[serde(default)]
    pub world: u32,
    #[serde(default)]
    pub plot: u32,
    #[serde(default)]
    pub style: u32,
    #[serde(default)]
    pub chapter_instructions: u32,
}

impl Default for BudgetWeights {
    fn default() -> Self {
        Self {
            system_prompt: 1,
            narrative: 3,
            character: 2,
            world: 1,
            plot: 2,
            style: 1,
            chapter_instructions: 1,
        }
    }
}

impl BudgetWeights {
    pub fn weight(&self, section: BudgetSection) -> u32 {
        match section {
            BudgetSection::SystemPrompt => self.system_prompt,
            BudgetSection::Narrative => self.narrative,
            BudgetSection::Character => self.character,
            BudgetSection::World => self.world,
            BudgetSection::Plot => self.plot,
            BudgetSection::Style => self.style,
            BudgetSection::ChapterInstructions => self.chapter_instructions,
        }
    }

    pub fn weighted_sections(&self) -> usize {
        BudgetSection::ALL
            .iter()
            .filter(|s| self.weight(**s) > 0)
            .count()
    }
}

/// Token 预算
///
/// 不变量: 各命名分区之和 + reserved <= total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub total: usize,
    pub reserved: usize,
    pub system_prompt: usize,
    pub narrative: usize,
    pub character: usize,
    pub world: usize,
    pub plot: usize,
    pub style: usize,
    pub chapter_instructions: usize,
}

impl TokenBudget {
    pub fn get(&self, section: BudgetSection) -> usize {
        match section {
            BudgetSection::SystemPrompt => self.system_prompt,
            BudgetSection::Narrative => self.narrative,
            BudgetSection::Character => self.character,
            BudgetSection::World => self.world,
            BudgetSection::Plot => self.plot,
            BudgetSection::Style => self.style,
            BudgetSection::ChapterInstructions => self.chapter_instructions,
        }
    }

    fn set(&mut self, section: BudgetSection, tokens: usize) {
        match section {
            BudgetSection::SystemPrompt => self.system_prompt = tokens,
            BudgetSection::Narrative => self.narrative = tokens,
            BudgetSection::Character => self.character = tokens,
            BudgetSection::World => self.world = tokens,
            BudgetSection::Plot => self.plot = tokens,
            BudgetSection::Style => self.style = tokens,
            BudgetSection::ChapterInstructions => self.chapter_instructions = tokens,
        }
    }

    /// 命名分区合计（不含 reserved）
    pub fn allocated(&self) -> usize {
        BudgetSection::ALL.iter().map(|s| self.get(*s)).sum()
    }

    pub fn is_within_total(&self) -> bool {
        self.allocated() + self.reserved <= self.total
    }

    /// 模型输出可用的 token 数
    pub fn output_tokens(&self) -> usize {
        self.reserved
    }
}

/// 已测量的各分区内容大小（token）
pub type SectionSizes = BTreeMap<BudgetSection, usize>;

/// 粗略估算文本 token 数（约 4 字符 / token）
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Token 预算分配器
///
/// 纯计算，无副作用，可并发重复调用
#[derive(Debug, Clone)]
pub struct TokenBudgetAllocator {
    weights: BudgetWeights,
    reserved_tokens: usize,
    min_section_tokens: usize,
}

impl TokenBudgetAllocator {
    pub fn new(weights: BudgetWeights, reserved_tokens: usize, min_section_tokens: usize) -> Self {
        Self {
            weights,
            reserved_tokens,
            min_section_tokens,
        }
    }

    pub fn weights(&self) -> &BudgetWeights {
        &self.weights
    }

    pub fn reserved_tokens(&self) -> usize {
        self.reserved_tokens
    }

    /// 最低可行预算：reserved + 每个有权重分区的最小份额
    pub fn minimum_viable(&self) -> usize {
        self.reserved_tokens + self.min_section_tokens * self.weights.weighted_sections()
    }

    /// 按权重分配
    pub fn allocate(&self, total: usize) -> Result<TokenBudget, BudgetError> {
        self.allocate_with_measurements(total, &SectionSizes::new())
    }

    /// 按权重和已测量内容大小分配
    ///
    /// 实际内容小于按权重应得份额的分区只分到其测量值，
    /// 多出的部分按权重再分给其余分区，直到稳定。
    /// 向下取整产生的余数归最大权重分区。
    pub fn allocate_with_measurements(
        &self,
        total: usize,
        measured: &SectionSizes,
    ) -> Result<TokenBudget, BudgetError> {
        if self.weights.weighted_sections() == 0 {
            return Err(BudgetError::NoWeightedSections);
        }
        let required = self.minimum_viable();
        if total < required {
            return Err(BudgetError::InsufficientTokens {
                available: total,
                required,
            });
        }

        let available = total - self.reserved_tokens;
        let mut allocation = [0usize; 7];
        let mut capped = [false; 7];

        for section in BudgetSection::ALL {
            if self.weights.weight(section) == 0 {
                capped[section.index()] = true;
            }
        }

        loop {
            let active: Vec<BudgetSection> = BudgetSection::ALL
                .into_iter()
                .filter(|s| !capped[s.index()])
                .collect();
            if active.is_empty() {
                break;
            }

            let fixed: usize = BudgetSection::ALL
                .iter()
                .filter(|s| capped[s.index()])
                .map(|s| allocation[s.index()])
                .sum();
            let remaining = available - fixed;
            let weight_sum: u64 = active.iter().map(|s| self.weights.weight(*s) as u64).sum();

            let shares: Vec<(BudgetSection, usize)> = active
                .iter()
                .map(|s| {
                    let share = (remaining as u128 * self.weights.weight(*s) as u128
                        / weight_sum as u128) as usize;
                    (*s, share)
                })
                .collect();

            let mut newly_capped = false;
            for (section, share) in &shares {
                if let Some(size) = measured.get(section) {
                    if *size <= *share {
                        allocation[section.index()] = *size;
                        capped[section.index()] = true;
                        newly_capped = true;
                    }
                }
            }
            if newly_capped {
                continue;
            }

            let mut used = 0;
            for (section, share) in &shares {
                allocation[section.index()] = *share;
                used += share;
            }
            if let Some(largest) = self.largest_weight(&active) {
                allocation[largest.index()] += remaining - used;
            }
            break;
        }

        let mut budget = TokenBudget {
            total,
            reserved: self.reserved_tokens,
            ..TokenBudget::default()
        };
        for section in BudgetSection::ALL {
            budget.set(section, allocation[section.index()]);
        }

        debug_assert!(budget.is_within_total());
        Ok(budget)
    }

    fn largest_weight(&self, sections: &[BudgetSection]) -> Option<BudgetSection> {
        let mut best: Option<BudgetSection> = None;
        for section in sections {
            match best {
                Some(current) if self.weights.weight(current) >= self.weights.weight(*section) => {}
                _ => best = Some(*section),
            }
        }
        best
    }
}
