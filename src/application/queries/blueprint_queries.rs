//! Blueprint Queries

use crate::domain::blueprint::BlueprintId;

/// 获取蓝图详情查询
#[derive(Debug, Clone)]
pub struct GetBlueprint {
    pub blueprint_id: BlueprintId,
}

/// 列出所有蓝图查询
#[derive(Debug, Clone)]
pub struct ListBlueprints;
