// Error types for the battle server and client.

use thiserror::Error;

use crate::battle::room::RoomStatus;
use crate::client::BattleState;
use crate::protocol::MessageKind;

/// Reasons the server refuses a frame, a message or a transition. None of
/// these are fatal: the caller logs them and carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BattleError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("reported {wpm} WPM exceeds the plausibility cap")]
    InvalidMetric { wpm: f64 },
    #[error("{kind} is not accepted while the room is {status}")]
    PrematureMessage { status: RoomStatus, kind: MessageKind },
    #[error("opponent disconnected")]
    PeerDisconnected,
    #[error("room already finished")]
    AlreadyFinished,
    #[error("final result already reported")]
    DuplicateResult,
    #[error("room is full")]
    RoomFull,
    #[error("player {0} is not in this room")]
    NotInRoom(String),
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: RoomStatus, to: RoomStatus },
}

/// Errors surfaced by the battle client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("opponent feed closed")]
    FeedClosed,
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: BattleState, to: BattleState },
}

/// Errors from the local battle history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history json error: {0}")]
    Json(#[from] serde_json::Error),
}
