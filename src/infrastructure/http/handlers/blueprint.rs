//! Blueprint Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{BlueprintSummary, GetBlueprint, ListBlueprints, SaveBlueprint};
use crate::domain::blueprint::BookBlueprint;
use crate::infrastructure::http::dto::{ApiResponse, GetBlueprintRequest};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 保存蓝图（新建或覆盖）
pub async fn save_blueprint(
    State(state): State<Arc<AppState>>,
    Json(blueprint): Json<BookBlueprint>,
) -> Result<Json<ApiResponse<BookBlueprint>>, ApiError> {
    let saved = state
        .save_blueprint_handler
        .handle(SaveBlueprint { blueprint })
        .await?;
    Ok(Json(ApiResponse::success(saved)))
}

pub async fn get_blueprint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetBlueprintRequest>,
) -> Result<Json<ApiResponse<BookBlueprint>>, ApiError> {
    let blueprint = state
        .get_blueprint_handler
        .handle(GetBlueprint {
            blueprint_id: req.id,
        })
        .await?;
    Ok(Json(ApiResponse::success(blueprint)))
}

pub async fn list_blueprints(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<BlueprintSummary>>>, ApiError> {
    let blueprints = state.list_blueprints_handler.handle(ListBlueprints).await?;
    Ok(Json(ApiResponse::success(blueprints)))
}
