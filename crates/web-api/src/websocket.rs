//! WebSocket 事件订阅
//!
//! 客户端带着 token 和频道名升级连接；成员资格在升级前检查一次，
//! 之后事件以 JSON 帧单向推送，入站帧只识别 Close。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use application::EventStream;
use domain::Channel;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
    channel: String,
}

pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = state.jwt_service.identity_from_token(&query.token)?;
    let channel: Channel = query.channel.parse().map_err(ApiError::from)?;
    let stream = state
        .subscription_service
        .subscribe(&identity, channel)
        .await?;

    Ok(ws.on_upgrade(move |socket| forward_events(socket, stream)))
}

async fn forward_events(socket: WebSocket, mut stream: EventStream) {
    let (mut sender, mut incoming) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(broadcast) = stream.recv().await {
            let payload = match serde_json::to_string(&broadcast) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize websocket payload");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            if matches!(message, WsMessage::Close(_)) {
                break;
            }
        }
    });

    let _ = tokio::join!(send_task, recv_task);
}
