//! Chapter Handlers - 重新生成、审批、修订

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{ApproveChapter, RegenerateChapter, ReviseChapter};
use crate::domain::generation::GeneratedChapter;
use crate::domain::session::GenerationSession;
use crate::infrastructure::http::dto::{ApiResponse, ChapterRequest, RegenerateRequest, ReviseRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn regenerate_chapter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegenerateRequest>,
) -> Result<Json<ApiResponse<GeneratedChapter>>, ApiError> {
    let chapter = state
        .regenerate_chapter_handler
        .handle(RegenerateChapter {
            session_id: req.session_id,
            chapter: req.chapter,
            options: req.options,
        })
        .await?;
    Ok(Json(ApiResponse::success(chapter)))
}

/// 审批通过后会话回到章节循环
pub async fn approve_chapter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChapterRequest>,
) -> Result<Json<ApiResponse<GenerationSession>>, ApiError> {
    let session = state
        .approve_chapter_handler
        .handle(ApproveChapter {
            session_id: req.session_id,
            chapter: req.chapter,
        })
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn revise_chapter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReviseRequest>,
) -> Result<Json<ApiResponse<GeneratedChapter>>, ApiError> {
    let chapter = state
        .revise_chapter_handler
        .handle(ReviseChapter {
            session_id: req.session_id,
            chapter: req.chapter,
            instructions: req.instructions,
        })
        .await?;
    Ok(Json(ApiResponse::success(chapter)))
}
