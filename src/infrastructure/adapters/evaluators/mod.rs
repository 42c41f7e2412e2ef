//! Evaluator Adapters - 基于规则的离线评估
//!
//! 不依赖模型服务；生产环境可替换为基于模型的实现

mod continuity_checker;
mod quality_evaluator;

pub use continuity_checker::HeuristicContinuityChecker;
pub use quality_evaluator::{HeuristicQualityEvaluator, QualityThresholds};
