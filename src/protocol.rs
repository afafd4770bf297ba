// Wire protocol shared by the battle server and the battle client.
//
// Every frame is a JSON object `{"type": "...", "data": {...}}`; messages
// without a payload carry only the `type` tag.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::BattleError;

/// Connection-scoped player identifier (the server assigns one per socket).
pub type PlayerId = String;

/// Reported WPM above this value is treated as cheating and dropped.
pub const MAX_PLAUSIBLE_WPM: f64 = 200.0;

// ── Client → Server ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinQueue(JoinQueue),
    JoinRoom(JoinRoom),
    TypingUpdate(ProgressUpdate),
    Finished(FinishReport),
    RequestRematch,
    Leave,
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::JoinQueue(_) => MessageKind::JoinQueue,
            ClientMessage::JoinRoom(_) => MessageKind::JoinRoom,
            ClientMessage::TypingUpdate(_) => MessageKind::TypingUpdate,
            ClientMessage::Finished(_) => MessageKind::Finished,
            ClientMessage::RequestRematch => MessageKind::RequestRematch,
            ClientMessage::Leave => MessageKind::Leave,
        }
    }
}

/// Payload-free discriminant of a [`ClientMessage`], used by the room's
/// acceptance table and in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    JoinQueue,
    JoinRoom,
    TypingUpdate,
    Finished,
    RequestRematch,
    Leave,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::JoinQueue => "join_queue",
            MessageKind::JoinRoom => "join_room",
            MessageKind::TypingUpdate => "typing_update",
            MessageKind::Finished => "finished",
            MessageKind::RequestRematch => "request_rematch",
            MessageKind::Leave => "leave",
        };
        f.write_str(name)
    }
}

/// Queue request. The whole payload is optional: a bare
/// `{"type":"join_queue"}` queues an anonymous player.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueue {
    pub display_name: String,
    /// The id the client will claim in `join_room`. When present the
    /// opponent's `matched` frame carries it, so it lines up with the keys
    /// of `game_over` and `opponent_progress`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

impl<'de> Deserialize<'de> for JoinQueue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            #[serde(default)]
            display_name: String,
            #[serde(default)]
            player_id: Option<PlayerId>,
        }

        let payload = Option::<Payload>::deserialize(deserializer)?;
        Ok(payload
            .map(|p| JoinQueue {
                display_name: p.display_name,
                player_id: p.player_id.filter(|id| !id.is_empty()),
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    #[serde(default)]
    pub player_id: String,
    #[serde(default)]
    pub display_name: String,
}

/// An in-progress sample as sent by the typing client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub char_index: u32,
    pub total_chars: u32,
    pub progress: f64,
    pub current_wpm: f64,
    pub current_accuracy: f64,
}

impl ProgressUpdate {
    /// Attach the sender identity and a server timestamp.
    pub fn stamped(self, player_id: impl Into<PlayerId>, timestamp: i64) -> TypingProgress {
        TypingProgress {
            player_id: player_id.into(),
            char_index: self.char_index,
            total_chars: self.total_chars,
            progress: self.progress,
            current_wpm: self.current_wpm,
            current_accuracy: self.current_accuracy,
            timestamp,
        }
    }
}

/// Completed-round metrics as sent by the typing client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishReport {
    pub wpm: f64,
    pub accuracy: f64,
    pub errors: u32,
    pub chars_typed: u32,
    /// Milliseconds from game start to completion.
    pub completion_time: u64,
}

impl FinishReport {
    pub fn from_player(self, player_id: impl Into<PlayerId>) -> FinalResult {
        FinalResult {
            player_id: player_id.into(),
            wpm: self.wpm,
            accuracy: self.accuracy,
            errors: self.errors,
            chars_typed: self.chars_typed,
            completion_time: self.completion_time,
        }
    }
}

// ── Server → Client ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Waiting(Waiting),
    Matched(Matched),
    Countdown(Countdown),
    GameStart(GameStart),
    OpponentProgress(TypingProgress),
    OpponentFinished(FinalResult),
    GameOver(BattleResult),
    OpponentLeft,
    RematchRequested(RematchRequested),
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waiting {
    pub position: usize,
    pub players_online: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player1,
    Player2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matched {
    pub room_id: String,
    pub passage: String,
    pub opponent: PlayerInfo,
    pub your_role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    /// Unix epoch milliseconds.
    pub start_time: i64,
}

/// Latest known snapshot of a player's typing state. Each new sample
/// replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingProgress {
    pub player_id: PlayerId,
    pub char_index: u32,
    pub total_chars: u32,
    pub progress: f64,
    pub current_wpm: f64,
    pub current_accuracy: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub player_id: PlayerId,
    pub wpm: f64,
    pub accuracy: f64,
    pub errors: u32,
    pub chars_typed: u32,
    pub completion_time: u64,
}

/// One player's entry in a [`BattleResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOutcome {
    pub player_id: PlayerId,
    pub display_name: String,
    pub wpm: f64,
    pub accuracy: f64,
    pub errors: u32,
    pub chars_typed: u32,
    pub completion_time: u64,
    pub is_winner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Margin {
    pub wpm_diff: f64,
    pub accuracy_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResult {
    /// `None` only on an exact wpm and accuracy tie.
    pub winner: Option<PlayerId>,
    pub players: BTreeMap<PlayerId, PlayerOutcome>,
    pub margin: Margin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RematchRequested {
    pub by: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

// ── Codec helpers ────────────────────────────────────────────────────

/// Parse an inbound client frame. Malformed frames are meant to be dropped
/// without a reply.
pub fn decode_client(text: &str) -> Result<ClientMessage, BattleError> {
    serde_json::from_str(text).map_err(|e| BattleError::MalformedMessage(e.to_string()))
}

/// Parse an inbound server frame (client side). Same silent-drop contract.
pub fn decode_server(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::debug!("Dropping malformed server frame: {e}");
            None
        }
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
