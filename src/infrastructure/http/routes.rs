//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                   GET   健康检查
//! - /api/blueprint/save         POST  保存蓝图
//! - /api/blueprint/get          POST  获取蓝图
//! - /api/blueprint/list         GET   列出蓝图
//! - /api/generation/start       POST  开始全书生成（后台执行，通过 WS 推送进度）
//! - /api/generation/chapter     POST  同步生成单章
//! - /api/session/pause          POST  暂停（章节边界生效）
//! - /api/session/resume         POST  恢复
//! - /api/session/cancel         POST  取消
//! - /api/session/get            POST  获取会话快照
//! - /api/session/statistics     POST  会话统计
//! - /api/session/list           GET   列出会话
//! - /api/chapter/regenerate     POST  重新生成章节
//! - /api/chapter/approve        POST  审批章节
//! - /api/chapter/revise         POST  按作者意见修订章节
//! - /ws/session/{id}            WS    会话进度事件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/session/:session_id", get(handlers::websocket_handler))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/blueprint", blueprint_routes())
        .nest("/generation", generation_routes())
        .nest("/session", session_routes())
        .nest("/chapter", chapter_routes())
}

/// Blueprint 路由
fn blueprint_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/save", post(handlers::save_blueprint))
        .route("/get", post(handlers::get_blueprint))
        .route("/list", get(handlers::list_blueprints))
}

/// Generation 路由
fn generation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(handlers::start_generation))
        .route("/chapter", post(handlers::generate_chapter))
}

/// Session 路由
fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pause", post(handlers::pause_session))
        .route("/resume", post(handlers::resume_session))
        .route("/cancel", post(handlers::cancel_session))
        .route("/get", post(handlers::get_session))
        .route("/statistics", post(handlers::get_statistics))
        .route("/list", get(handlers::list_sessions))
}

/// Chapter 路由
fn chapter_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/regenerate", post(handlers::regenerate_chapter))
        .route("/approve", post(handlers::approve_chapter))
        .route("/revise", post(handlers::revise_chapter))
}
