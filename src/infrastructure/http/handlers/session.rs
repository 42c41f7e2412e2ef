//! Session Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{
    CancelSession, GetSession, GetStatistics, ListSessions, PauseSession, ResumeSession,
    SessionSummary,
};
use crate::domain::generation::GenerationStatistics;
use crate::domain::session::GenerationSession;
use crate::infrastructure::http::dto::{ApiResponse, SessionRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn pause_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ApiResponse<GenerationSession>>, ApiError> {
    let session = state
        .pause_session_handler
        .handle(PauseSession {
            session_id: req.session_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn resume_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ApiResponse<GenerationSession>>, ApiError> {
    let session = state
        .resume_session_handler
        .handle(ResumeSession {
            session_id: req.session_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ApiResponse<GenerationSession>>, ApiError> {
    let session = state
        .cancel_session_handler
        .handle(CancelSession {
            session_id: req.session_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ApiResponse<GenerationSession>>, ApiError> {
    let session = state
        .get_session_handler
        .handle(GetSession {
            session_id: req.session_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<ApiResponse<GenerationStatistics>>, ApiError> {
    let statistics = state
        .get_statistics_handler
        .handle(GetStatistics {
            session_id: req.session_id,
        })
        .await?;
    Ok(Json(ApiResponse::success(statistics)))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<SessionSummary>>>, ApiError> {
    let sessions = state.list_sessions_handler.handle(ListSessions).await?;
    Ok(Json(ApiResponse::success(sessions)))
}
