// WebSocket handlers for the matchmaker and for battle rooms.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::sync::mpsc;

use super::AppState;
use crate::battle::RoomHandle;
use crate::metrics;
use crate::protocol::{self, ClientMessage, JoinRoom, ServerMessage};
use crate::rate_limit::RateLimitType;

/// WebSocket upgrade handler for the matchmaking queue.
pub async fn ws_matchmaker(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_matchmaker(socket, state))
}

/// WebSocket upgrade handler for one battle room.
pub async fn ws_battle(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_battle(socket, room_id, state))
}

async fn send_frame(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize server message: {e}");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await?;
    metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
    Ok(())
}

/// Decode one inbound text frame after the per-connection rate check.
/// Malformed frames are dropped without a reply.
fn admit(
    state: &AppState,
    conn_id: &str,
    text: &str,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<ClientMessage> {
    if let Err(e) = state.rate_limiter.check_limit(conn_id, RateLimitType::Messages) {
        let _ = tx.send(ServerMessage::error(e.to_string()));
        return None;
    }
    match protocol::decode_client(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            metrics::UPDATES_REJECTED_TOTAL
                .with_label_values(&[metrics::rejection_reason(&e)])
                .inc();
            tracing::debug!(conn = %conn_id, "Ignoring frame: {e}");
            None
        }
    }
}

// ── Matchmaker ───────────────────────────────────────────────────────

async fn handle_matchmaker(mut socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.matchmaker.connect(&conn_id, tx.clone());
    metrics::CONNECTED_WEBSOCKETS.inc();
    tracing::debug!(conn = %conn_id, "Matchmaker connection opened");

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if send_frame(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(msg) = admit(&state, &conn_id, text.as_str(), &tx) else {
                        continue;
                    };
                    match msg {
                        ClientMessage::JoinQueue(join) => {
                            match state.rate_limiter.check_limit(&conn_id, RateLimitType::QueueJoins) {
                                Ok(()) => state.matchmaker.join_queue(
                                    &conn_id,
                                    join.player_id.as_deref(),
                                    &join.display_name,
                                ),
                                Err(e) => {
                                    let _ = tx.send(ServerMessage::error(e.to_string()));
                                }
                            }
                        }
                        ClientMessage::Leave => state.matchmaker.leave(&conn_id),
                        other => {
                            tracing::debug!(conn = %conn_id, kind = %other.kind(), "Ignoring non-matchmaking message");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }

    state.matchmaker.disconnect(&conn_id);
    state.rate_limiter.forget(&conn_id);
    metrics::CONNECTED_WEBSOCKETS.dec();
    tracing::debug!(conn = %conn_id, "Matchmaker connection closed");
}

// ── Battle room ──────────────────────────────────────────────────────

async fn handle_battle(mut socket: WebSocket, room_id: String, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut room: Option<RoomHandle> = None;
    metrics::CONNECTED_WEBSOCKETS.inc();
    tracing::debug!(conn = %conn_id, room = %room_id, "Battle connection opened");

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if send_frame(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(msg) = admit(&state, &conn_id, text.as_str(), &tx) else {
                        continue;
                    };
                    match msg {
                        ClientMessage::JoinRoom(join) if room.is_none() => {
                            room = join_room(&state, &room_id, &conn_id, join, &tx);
                        }
                        msg => match &room {
                            Some(handle) => {
                                handle.send(&conn_id, msg);
                            }
                            None => {
                                tracing::debug!(conn = %conn_id, kind = %msg.kind(), "Message before join_room dropped");
                            }
                        },
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }

    if let Some(handle) = room {
        handle.disconnect(&conn_id);
    }
    state.rate_limiter.forget(&conn_id);
    metrics::CONNECTED_WEBSOCKETS.dec();
    tracing::debug!(conn = %conn_id, room = %room_id, "Battle connection closed");
}

/// Seat this connection in the room named by the URL. Unknown rooms get an
/// error frame; the socket stays open.
fn join_room(
    state: &AppState,
    room_id: &str,
    conn_id: &str,
    join: JoinRoom,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<RoomHandle> {
    let player_id = if join.player_id.is_empty() {
        conn_id.to_string()
    } else {
        join.player_id
    };
    match state.rooms.get(room_id) {
        Some(handle) if handle.join(conn_id, &player_id, &join.display_name, tx.clone()) => {
            Some(handle)
        }
        _ => {
            tracing::debug!(conn = %conn_id, room = %room_id, "join_room for unknown room");
            let _ = tx.send(ServerMessage::error("room not found"));
            None
        }
    }
}
