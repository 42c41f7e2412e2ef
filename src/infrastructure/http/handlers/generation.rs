//! Generation Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{GenerateChapter, GenerationStart, GetBlueprint, StartGeneration};
use crate::domain::generation::GeneratedChapter;
use crate::infrastructure::http::dto::{
    ApiResponse, ChapterRequest, StartGenerationRequest, StartGenerationResponse,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 开始全书生成，章节循环由后台 worker 执行
pub async fn start_generation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartGenerationRequest>,
) -> Result<Json<ApiResponse<StartGenerationResponse>>, ApiError> {
    let blueprint = match (req.blueprint, req.blueprint_id) {
        (Some(blueprint), _) => blueprint,
        (None, Some(blueprint_id)) => {
            state
                .get_blueprint_handler
                .handle(GetBlueprint { blueprint_id })
                .await?
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Either blueprint or blueprint_id is required".to_string(),
            ))
        }
    };

    let start = state
        .start_generation_handler
        .handle(StartGeneration {
            blueprint,
            options: req.options,
        })
        .await?;

    let response = match start {
        GenerationStart::Started(session) => StartGenerationResponse::Started { session },
        GenerationStart::DryRun(report) => StartGenerationResponse::DryRun { report },
    };
    Ok(Json(ApiResponse::success(response)))
}

/// 同步生成单章（请求在章节结束后返回）
pub async fn generate_chapter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChapterRequest>,
) -> Result<Json<ApiResponse<GeneratedChapter>>, ApiError> {
    let chapter = state
        .generate_chapter_handler
        .handle(GenerateChapter {
            session_id: req.session_id,
            chapter: req.chapter,
        })
        .await?;
    Ok(Json(ApiResponse::success(chapter)))
}
