//! WebSocket Handler - 会话进度推送

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::application::SessionSummary;
use crate::domain::session::{GenerationSession, SessionId};
use crate::infrastructure::http::state::AppState;

/// Session WebSocket 连接处理（推送 ProgressEvent）
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session_socket(socket, session_id, state))
}

/// 连接时先发送一次会话快照
fn snapshot_message(session: &GenerationSession) -> Option<Message> {
    let snapshot = serde_json::json!({
        "event": "snapshot",
        "data": SessionSummary::from(session),
    });
    match serde_json::to_string(&snapshot) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize session snapshot");
            None
        }
    }
}

async fn send_snapshot(sender: &mut SplitSink<WebSocket, Message>, session: &GenerationSession) {
    if let Some(msg) = snapshot_message(session) {
        if let Err(e) = sender.send(msg).await {
            tracing::debug!(session_id = %session.id(), error = %e, "Failed to send snapshot");
        }
    }
}

async fn handle_session_socket(socket: WebSocket, raw_id: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let Ok(session_id) = SessionId::from_str(&raw_id) else {
        tracing::warn!(session_id = %raw_id, "WebSocket connection rejected: malformed session id");
        let _ = sender.close().await;
        return;
    };

    // 验证会话存在
    let session = match state.orchestrator.get_session(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "WebSocket connection rejected");
            let _ = sender.close().await;
            return;
        }
    };

    if session.status().is_terminal() {
        send_snapshot(&mut sender, &session).await;
        let _ = sender.close().await;
        return;
    }

    let mut event_rx = state.progress.subscribe(&session_id);

    // 订阅期间会话可能已结束，此时通道不会再被关闭
    let session = state
        .orchestrator
        .get_session(&session_id)
        .await
        .unwrap_or(session);
    send_snapshot(&mut sender, &session).await;
    if session.status().is_terminal() {
        drop(event_rx);
        state.progress.close(&session_id);
        let _ = sender.close().await;
        return;
    }

    tracing::info!(session_id = %session_id, "WebSocket connected");

    // 事件转发任务
    let mut forward_task = tokio::spawn(async move {
        loop {
            let event = match event_rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        session_id = %session_id,
                        skipped,
                        "WebSocket subscriber lagged, events dropped"
                    );
                    continue;
                }
                Err(RecvError::Closed) => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            let msg = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize progress event");
                    continue;
                }
            };

            if let Err(e) = sender.send(msg).await {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to send WebSocket message"
                );
                break;
            }
        }
    });

    // 接收客户端消息（心跳由 axum 自动响应）
    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::info!(session_id = %session_id, "WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // 等待任一任务完成
    tokio::select! {
        _ = &mut forward_task => receive_task.abort(),
        _ = &mut receive_task => forward_task.abort(),
    }

    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}
