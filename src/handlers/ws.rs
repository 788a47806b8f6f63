// src/handlers/ws.rs

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;

use crate::{broadcast::RoomHub, error::AppError, models::participant::ROOM_CODE_PATTERN};

/// Upgrades to a WebSocket that streams every event of one room.
///
/// The stream is read-only: answers and host commands go through HTTP.
pub async fn room_socket(
    State(hub): State<Arc<RoomHub>>,
    Path(room_code): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    if !ROOM_CODE_PATTERN.is_match(&room_code) {
        return Err(AppError::BadRequest("Room code must be six digits.".to_string()));
    }

    Ok(ws.on_upgrade(move |socket| stream_room(hub, room_code, socket)))
}

async fn stream_room(hub: Arc<RoomHub>, room_code: String, mut socket: WebSocket) {
    let mut events = hub.subscribe(&room_code);
    tracing::debug!(room = %room_code, "subscriber connected");

    loop {
        tokio::select! {
            // Outbound: room events to the client.
            received = events.recv() => {
                match received {
                    Ok(message) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("Failed to encode room event: {:?}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(room = %room_code, skipped, "slow subscriber skipped events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            // Inbound: only watched for disconnects.
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => continue,
                }
            }
        }
    }

    drop(events);
    hub.prune(&room_code);
    tracing::debug!(room = %room_code, "subscriber disconnected");
}
