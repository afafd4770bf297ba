// Authoritative two-player room state machine.
//
// `Room` holds no timers and no connections: it validates each message
// against an explicit acceptance table, mutates its own player map and
// returns the frames that should go out. The actor in `actor.rs` owns the
// clock and the sockets.

use std::fmt;

use serde::Serialize;

use crate::error::BattleError;
use crate::outcome::{self, Contestant};
use crate::protocol::{
    BattleResult, Countdown, FinalResult, FinishReport, GameStart, MessageKind, PlayerId,
    ProgressUpdate, RematchRequested, ServerMessage, TypingProgress, MAX_PLAUSIBLE_WPM,
};

/// Rooms never seat more than this many players.
pub const MAX_PLAYERS: usize = 2;

/// Room lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Countdown,
    Playing,
    Finished,
}

impl RoomStatus {
    /// The forward-only transition table.
    pub fn advance(self, to: RoomStatus) -> Result<RoomStatus, BattleError> {
        use RoomStatus::*;
        match (self, to) {
            (Waiting, Countdown) | (Countdown, Playing) | (Playing, Finished) => Ok(to),
            (Finished, Finished) => Err(BattleError::AlreadyFinished),
            (from, to) => Err(BattleError::InvalidTransition { from, to }),
        }
    }

    /// Which client messages a room in this status will act on.
    pub fn accepts(self, kind: MessageKind) -> bool {
        use MessageKind::*;
        match self {
            RoomStatus::Waiting => matches!(kind, JoinRoom | Leave),
            RoomStatus::Countdown => matches!(kind, Leave),
            RoomStatus::Playing => matches!(kind, TypingUpdate | Finished | Leave),
            RoomStatus::Finished => matches!(kind, RequestRematch | Leave),
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Countdown => "countdown",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    pub id: PlayerId,
    pub display_name: String,
    pub progress: Option<TypingProgress>,
    pub result: Option<FinalResult>,
}

/// Who a frame produced by the room is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    All,
    Except(PlayerId),
}

impl Recipient {
    pub fn includes(&self, player_id: &str) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Except(excluded) => excluded != player_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: Recipient,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn broadcast(message: ServerMessage) -> Self {
        Self {
            to: Recipient::All,
            message,
        }
    }

    pub fn to_others(sender: &str, message: ServerMessage) -> Self {
        Self {
            to: Recipient::Except(sender.to_string()),
            message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    id: String,
    status: RoomStatus,
    passage: String,
    start_time: Option<i64>,
    players: Vec<PlayerData>,
}

impl Room {
    pub fn new(id: impl Into<String>, passage: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RoomStatus::Waiting,
            passage: passage.into(),
            start_time: None,
            players: Vec::with_capacity(MAX_PLAYERS),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn passage(&self) -> &str {
        &self.passage
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn players(&self) -> &[PlayerData] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&PlayerData> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: &str) -> Result<&mut PlayerData, BattleError> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| BattleError::NotInRoom(id.to_string()))
    }

    fn check(&self, kind: MessageKind) -> Result<(), BattleError> {
        if self.status.accepts(kind) {
            Ok(())
        } else {
            Err(BattleError::PrematureMessage {
                status: self.status,
                kind,
            })
        }
    }

    /// Seat a player. Returns `true` when the room has just become full and
    /// should start its countdown. Joining twice is a no-op.
    pub fn join(&mut self, id: &str, display_name: &str) -> Result<bool, BattleError> {
        if self.player(id).is_some() {
            return Ok(false);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(BattleError::RoomFull);
        }
        self.check(MessageKind::JoinRoom)?;

        let display_name = match display_name.trim() {
            "" => "Player",
            name => name,
        };
        self.players.push(PlayerData {
            id: id.to_string(),
            display_name: display_name.to_string(),
            progress: None,
            result: None,
        });
        Ok(self.players.len() == MAX_PLAYERS)
    }

    pub fn begin_countdown(&mut self) -> Result<(), BattleError> {
        self.status = self.status.advance(RoomStatus::Countdown)?;
        Ok(())
    }

    pub fn countdown(count: u8) -> Outbound {
        Outbound::broadcast(ServerMessage::Countdown(Countdown { count }))
    }

    /// Countdown reached zero: open the round.
    pub fn start(&mut self, now_ms: i64) -> Result<Outbound, BattleError> {
        self.status = self.status.advance(RoomStatus::Playing)?;
        self.start_time = Some(now_ms);
        Ok(Outbound::broadcast(ServerMessage::GameStart(GameStart {
            start_time: now_ms,
        })))
    }

    /// Store the sender's latest sample and relay it to the other player.
    pub fn typing_update(
        &mut self,
        from: &str,
        update: ProgressUpdate,
        now_ms: i64,
    ) -> Result<Outbound, BattleError> {
        self.check(MessageKind::TypingUpdate)?;
        if update.current_wpm > MAX_PLAUSIBLE_WPM {
            return Err(BattleError::InvalidMetric {
                wpm: update.current_wpm,
            });
        }

        let progress = update.stamped(from, now_ms);
        self.player_mut(from)?.progress = Some(progress.clone());
        Ok(Outbound::to_others(
            from,
            ServerMessage::OpponentProgress(progress),
        ))
    }

    /// Store the sender's final result and relay it. The returned flag is
    /// `true` once every seated player has reported.
    pub fn finished(
        &mut self,
        from: &str,
        report: FinishReport,
    ) -> Result<(Outbound, bool), BattleError> {
        self.check(MessageKind::Finished)?;
        if report.wpm > MAX_PLAUSIBLE_WPM {
            return Err(BattleError::InvalidMetric { wpm: report.wpm });
        }

        let player = self.player_mut(from)?;
        if player.result.is_some() {
            return Err(BattleError::DuplicateResult);
        }
        let result = report.from_player(from);
        player.result = Some(result.clone());

        let all_done =
            self.players.len() == MAX_PLAYERS && self.players.iter().all(|p| p.result.is_some());
        Ok((
            Outbound::to_others(from, ServerMessage::OpponentFinished(result)),
            all_done,
        ))
    }

    /// Close the round and compute the winner. A second call fails with
    /// `AlreadyFinished`, so the result is produced at most once.
    pub fn end(&mut self) -> Result<BattleResult, BattleError> {
        let [a, b] = self.players.as_slice() else {
            return Err(BattleError::PeerDisconnected);
        };
        let result = outcome::decide([
            Contestant {
                player_id: &a.id,
                display_name: &a.display_name,
                result: a.result.as_ref(),
            },
            Contestant {
                player_id: &b.id,
                display_name: &b.display_name,
                result: b.result.as_ref(),
            },
        ]);
        self.status = self.status.advance(RoomStatus::Finished)?;
        Ok(result)
    }

    pub fn rematch(&self, from: &str) -> Result<Outbound, BattleError> {
        self.check(MessageKind::RequestRematch)?;
        if self.player(from).is_none() {
            return Err(BattleError::NotInRoom(from.to_string()));
        }
        Ok(Outbound::to_others(
            from,
            ServerMessage::RematchRequested(RematchRequested {
                by: from.to_string(),
            }),
        ))
    }

    /// Remove a player and produce the notice for whoever remains.
    pub fn leave(&mut self, from: &str) -> Result<Outbound, BattleError> {
        let idx = self
            .players
            .iter()
            .position(|p| p.id == from)
            .ok_or_else(|| BattleError::NotInRoom(from.to_string()))?;
        self.players.remove(idx);
        Ok(Outbound::to_others(from, ServerMessage::OpponentLeft))
    }

    /// A match that lost a player after pairing but before it finished.
    pub fn is_abandoned(&self) -> bool {
        matches!(self.status, RoomStatus::Countdown | RoomStatus::Playing)
            && self.players.len() < MAX_PLAYERS
    }
}
