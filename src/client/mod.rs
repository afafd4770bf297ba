// Client side of a battle: the controller, its opponent feeds and the bot.

pub mod bot;
pub mod controller;
pub mod feed;
pub mod simulated;
pub mod timer;
pub mod typing;

use std::fmt;

use crate::protocol::ServerMessage;

pub use controller::{BattleController, ControllerConfig};
pub use feed::{OpponentFeed, RemoteOpponentFeed};
pub use simulated::SimulatedOpponentFeed;

/// Player-visible battle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleState {
    Idle,
    Searching,
    Matched,
    Countdown,
    Playing,
    Finished,
    Disconnected,
}

impl BattleState {
    /// Transition table. Any state may fall back to `Idle`.
    pub fn allows(self, to: BattleState) -> bool {
        use BattleState::*;
        match (self, to) {
            (_, Idle) => true,
            (Idle | Finished | Disconnected, Searching) => true,
            (Searching, Matched) => true,
            (Matched | Countdown, Countdown) => true,
            (Countdown, Playing) => true,
            (Playing, Finished) => true,
            (Searching | Matched | Countdown | Playing, Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BattleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BattleState::Idle => "idle",
            BattleState::Searching => "searching",
            BattleState::Matched => "matched",
            BattleState::Countdown => "countdown",
            BattleState::Playing => "playing",
            BattleState::Finished => "finished",
            BattleState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Everything the controller reacts to, funnelled through one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Server(ServerMessage),
    /// Time to sample and submit local progress.
    SampleTick,
    /// One second of the local round clock elapsed.
    ClockTick,
    /// The active feed has no more messages.
    FeedClosed,
}
