// Offline feed: a scripted match against the bot simulator.
//
// The script replays what a server room would send (matched, countdown,
// game start, opponent progress) and answers the player's `finished` with a
// `game_over` computed by the same winner algorithm the server uses.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{self, Instant};

use super::bot::{BotSimulator, BOT_PLAYER_ID, TICK};
use super::feed::OpponentFeed;
use super::timer::TimerGuard;
use super::ControllerEvent;
use crate::error::ClientError;
use crate::outcome::{self, Contestant};
use crate::passages;
use crate::protocol::{
    now_millis, ClientMessage, Countdown, FinalResult, GameStart, Matched, PlayerInfo, Role,
    ServerMessage,
};

/// The local player's id inside a simulated battle.
pub const LOCAL_PLAYER_ID: &str = "local";

const SEARCH_DELAY_MS: std::ops::Range<u64> = 2_000..5_000;
const REVEAL_PAUSE: Duration = Duration::from_millis(1_200);
const COUNTDOWN_FROM: u8 = 3;
const COUNTDOWN_STEP: Duration = Duration::from_secs(1);
const GO_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug)]
pub struct SimulatedOpponentFeed {
    commands: UnboundedSender<ClientMessage>,
    _task: TimerGuard,
}

impl SimulatedOpponentFeed {
    pub fn start(display_name: &str, events: UnboundedSender<ControllerEvent>, rng: StdRng) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let script = Script {
            display_name: display_name.to_string(),
            bot_name: String::new(),
            events,
            commands: rx,
        };
        tracing::debug!("Starting simulated battle");
        Self {
            commands,
            _task: TimerGuard::spawn(script.run(rng)),
        }
    }
}

impl OpponentFeed for SimulatedOpponentFeed {
    fn player_id(&self) -> &str {
        LOCAL_PLAYER_ID
    }

    fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        self.commands
            .send(message)
            .map_err(|_| ClientError::FeedClosed)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

struct Script {
    display_name: String,
    bot_name: String,
    events: UnboundedSender<ControllerEvent>,
    commands: UnboundedReceiver<ClientMessage>,
}

impl Script {
    fn emit(&self, msg: ServerMessage) -> bool {
        self.events.send(ControllerEvent::Server(msg)).is_ok()
    }

    /// Sleep, draining commands meanwhile. False once the player left.
    async fn pause(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(ClientMessage::Leave) | None => return false,
                    Some(_) => {}
                }
            }
        }
    }

    async fn run(mut self, mut rng: StdRng) {
        let delay = Duration::from_millis(rng.gen_range(SEARCH_DELAY_MS));
        if !self.pause(delay).await {
            return;
        }

        let passage = passages::random_passage(&mut rng);
        self.bot_name = passages::random_bot_name(&mut rng).to_string();
        let matched = ServerMessage::Matched(Matched {
            room_id: format!("local-{}", now_millis()),
            passage: passage.to_string(),
            opponent: PlayerInfo {
                id: BOT_PLAYER_ID.to_string(),
                display_name: self.bot_name.clone(),
            },
            your_role: Role::Player1,
        });
        if !self.emit(matched) || !self.pause(REVEAL_PAUSE).await {
            return;
        }

        for count in (0..=COUNTDOWN_FROM).rev() {
            let wait = if count == 0 { GO_DELAY } else { COUNTDOWN_STEP };
            if !self.emit(ServerMessage::Countdown(Countdown { count })) || !self.pause(wait).await
            {
                return;
            }
        }
        if !self.emit(ServerMessage::GameStart(GameStart {
            start_time: now_millis(),
        })) {
            return;
        }

        let bot = BotSimulator::new(passage.chars().count(), rng);
        self.play(bot).await;
    }

    async fn play(&mut self, mut bot: BotSimulator<StdRng>) {
        let mut ticker = time::interval_at(Instant::now() + TICK, TICK);
        let mut bot_result: Option<FinalResult> = None;

        loop {
            tokio::select! {
                _ = ticker.tick(), if bot_result.is_none() => {
                    let progress = bot.tick();
                    if !self.emit(ServerMessage::OpponentProgress(progress)) {
                        return;
                    }
                    if bot.is_complete() {
                        let result = bot.finish();
                        tracing::debug!(wpm = result.wpm, "Bot finished");
                        if !self.emit(ServerMessage::OpponentFinished(result.clone())) {
                            return;
                        }
                        bot_result = Some(result);
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(ClientMessage::Finished(report)) => {
                        let bot_final = bot_result.take().unwrap_or_else(|| bot.finish());
                        let mine = report.from_player(LOCAL_PLAYER_ID);
                        let result = outcome::decide([
                            Contestant {
                                player_id: LOCAL_PLAYER_ID,
                                display_name: &self.display_name,
                                result: Some(&mine),
                            },
                            Contestant {
                                player_id: BOT_PLAYER_ID,
                                display_name: &self.bot_name,
                                result: Some(&bot_final),
                            },
                        ]);
                        self.emit(ServerMessage::GameOver(result));
                        return;
                    }
                    Some(ClientMessage::Leave) | None => return,
                    Some(_) => {}
                }
            }
        }
    }
}
