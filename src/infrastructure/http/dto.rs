//! Data Transfer Objects

use serde::{Deserialize, Serialize};

use crate::application::{AuthorInstructions, DryRunReport, RegenerateOptions};
use crate::domain::blueprint::{BlueprintId, BookBlueprint};
use crate::domain::session::{GenerationOptions, GenerationSession, SessionId};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

/// 空数据响应
#[derive(Debug, Serialize)]
pub struct Empty {}

impl ApiResponse<Empty> {
    /// 成功但无数据
    pub fn ok() -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(Empty {}),
        }
    }
}

// ============================================================================
// Blueprint DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GetBlueprintRequest {
    pub id: BlueprintId,
}

// ============================================================================
// Generation DTOs
// ============================================================================

/// 开始生成：直接携带蓝图，或引用已保存的蓝图
#[derive(Debug, Deserialize)]
pub struct StartGenerationRequest {
    #[serde(default)]
    pub blueprint: Option<BookBlueprint>,
    #[serde(default)]
    pub blueprint_id: Option<BlueprintId>,
    #[serde(default)]
    pub options: GenerationOptions,
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartGenerationResponse {
    Started { session: GenerationSession },
    DryRun { report: DryRunReport },
}

#[derive(Debug, Deserialize)]
pub struct ChapterRequest {
    pub session_id: SessionId,
    pub chapter: u32,
}

// ============================================================================
// Session DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: SessionId,
}

// ============================================================================
// Chapter DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub session_id: SessionId,
    pub chapter: u32,
    #[serde(flatten)]
    pub options: RegenerateOptions,
}

#[derive(Debug, Deserialize)]
pub struct ReviseRequest {
    pub session_id: SessionId,
    pub chapter: u32,
    #[serde(flatten)]
    pub instructions: AuthorInstructions,
}
