// Player-facing battle state machine.
//
// The controller owns one opponent feed per match, the local typing buffer,
// and two scoped timers (progress sampler and round clock). Everything it
// reacts to arrives as a `ControllerEvent` on a single channel that is
// replaced on teardown, so nothing from a previous match can leak into the
// next one.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use super::feed::{OpponentFeed, RemoteOpponentFeed};
use super::simulated::SimulatedOpponentFeed;
use super::timer::TimerGuard;
use super::typing::TypingSession;
use super::{BattleState, ControllerEvent};
use crate::error::ClientError;
use crate::protocol::{
    BattleResult, FinalResult, PlayerId, PlayerInfo, ProgressUpdate, ServerMessage,
    TypingProgress,
};
use crate::stats::{BattleLedger, CompletedAttempt};

const CLOCK_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base WebSocket url of the battle server. `None` always plays the bot.
    pub server_url: Option<String>,
    /// Local round length; the room's own cap is slightly longer.
    pub round: Duration,
    pub sample_every: Duration,
    /// Seeds the bot path for reproducible offline battles.
    pub seed: Option<u64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            round: Duration::from_secs(60),
            sample_every: Duration::from_millis(500),
            seed: None,
        }
    }
}

pub struct BattleController {
    config: ControllerConfig,
    state: BattleState,
    display_name: String,
    feed: Option<Box<dyn OpponentFeed>>,
    events_tx: UnboundedSender<ControllerEvent>,
    events_rx: UnboundedReceiver<ControllerEvent>,

    // ── Current match ──
    search_started: Option<Instant>,
    queue_position: Option<usize>,
    room_id: Option<String>,
    passage: Option<String>,
    opponent: Option<PlayerInfo>,
    countdown: Option<u8>,
    seconds_left: u32,
    typing: Option<TypingSession>,
    started_at: Option<Instant>,
    submitted: bool,
    my_progress: Option<ProgressUpdate>,
    opponent_progress: Option<TypingProgress>,
    opponent_result: Option<FinalResult>,
    opponent_left: bool,
    result: Option<BattleResult>,
    rematch_requested_by: Option<PlayerId>,
    last_error: Option<String>,

    sampler: Option<TimerGuard>,
    clock: Option<TimerGuard>,

    ledger: Option<Box<dyn BattleLedger>>,
    prior_best_wpm: Option<f64>,
    last_attempt: Option<CompletedAttempt>,
    rng: StdRng,
}

impl BattleController {
    pub fn new(config: ControllerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let seconds_left = config.round.as_secs() as u32;
        Self {
            config,
            state: BattleState::Idle,
            display_name: String::new(),
            feed: None,
            events_tx,
            events_rx,
            search_started: None,
            queue_position: None,
            room_id: None,
            passage: None,
            opponent: None,
            countdown: None,
            seconds_left,
            typing: None,
            started_at: None,
            submitted: false,
            my_progress: None,
            opponent_progress: None,
            opponent_result: None,
            opponent_left: false,
            result: None,
            rematch_requested_by: None,
            last_error: None,
            sampler: None,
            clock: None,
            ledger: None,
            prior_best_wpm: None,
            last_attempt: None,
            rng,
        }
    }

    /// Hand finished battles to `ledger`.
    pub fn with_ledger(mut self, ledger: impl BattleLedger + 'static) -> Self {
        self.ledger = Some(Box::new(ledger));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn state(&self) -> BattleState {
        self.state
    }

    pub fn is_simulated(&self) -> bool {
        self.feed.as_ref().is_some_and(|f| f.is_simulated())
    }

    pub fn player_id(&self) -> Option<&str> {
        self.feed.as_ref().map(|f| f.player_id())
    }

    pub fn search_elapsed(&self) -> Option<Duration> {
        match self.state {
            BattleState::Searching => self.search_started.map(|t| t.elapsed()),
            _ => None,
        }
    }

    pub fn queue_position(&self) -> Option<usize> {
        self.queue_position
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn passage(&self) -> Option<&str> {
        self.passage.as_deref()
    }

    pub fn opponent(&self) -> Option<&PlayerInfo> {
        self.opponent.as_ref()
    }

    pub fn countdown(&self) -> Option<u8> {
        self.countdown
    }

    pub fn seconds_left(&self) -> u32 {
        self.seconds_left
    }

    pub fn typing(&self) -> Option<&TypingSession> {
        self.typing.as_ref()
    }

    pub fn has_submitted(&self) -> bool {
        self.submitted
    }

    pub fn my_progress(&self) -> Option<&ProgressUpdate> {
        self.my_progress.as_ref()
    }

    pub fn opponent_progress(&self) -> Option<&TypingProgress> {
        self.opponent_progress.as_ref()
    }

    pub fn opponent_result(&self) -> Option<&FinalResult> {
        self.opponent_result.as_ref()
    }

    pub fn opponent_left(&self) -> bool {
        self.opponent_left
    }

    pub fn result(&self) -> Option<&BattleResult> {
        self.result.as_ref()
    }

    pub fn rematch_requested_by(&self) -> Option<&str> {
        self.rematch_requested_by.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Best WPM on record before the last battle was recorded.
    pub fn prior_best_wpm(&self) -> Option<f64> {
        self.prior_best_wpm
    }

    pub fn last_attempt(&self) -> Option<&CompletedAttempt> {
        self.last_attempt.as_ref()
    }

    // ── Player actions ───────────────────────────────────────────────

    /// Start a matchmaking cycle. The battle server is tried first when one
    /// is configured; if it cannot be reached the bot stands in.
    pub async fn find_opponent(&mut self, display_name: &str) -> Result<(), ClientError> {
        self.check(BattleState::Searching)?;
        self.teardown();
        self.reset_match();

        self.display_name = display_name.to_string();
        self.state = BattleState::Searching;
        self.search_started = Some(Instant::now());

        let remote = match self.config.server_url.clone() {
            Some(url) => {
                match RemoteOpponentFeed::connect(&url, display_name, self.events_tx.clone()).await
                {
                    Ok(feed) => Some(feed),
                    Err(e) => {
                        tracing::warn!("Battle server unavailable, playing the bot: {e}");
                        None
                    }
                }
            }
            None => None,
        };
        let feed: Box<dyn OpponentFeed> = match remote {
            Some(feed) => Box::new(feed),
            None => {
                let rng = StdRng::seed_from_u64(self.rng.gen());
                Box::new(SimulatedOpponentFeed::start(
                    display_name,
                    self.events_tx.clone(),
                    rng,
                ))
            }
        };
        tracing::info!(
            name = %display_name,
            simulated = feed.is_simulated(),
            "Searching for an opponent"
        );
        self.feed = Some(feed);
        Ok(())
    }

    /// Abandon a search in progress. No-op in any other state.
    pub fn cancel_search(&mut self) {
        if self.state != BattleState::Searching {
            return;
        }
        self.teardown();
        self.reset_match();
        self.state = BattleState::Idle;
        tracing::info!("Search cancelled");
    }

    /// Leave whatever is going on and return to idle.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.reset_match();
        self.state = BattleState::Idle;
    }

    /// Ask the opponent for a rematch and queue up again. The rematch is a
    /// fresh matchmaking cycle; it may pair with someone else.
    pub async fn request_rematch(&mut self) -> Result<(), ClientError> {
        if self.state != BattleState::Finished {
            return Err(ClientError::InvalidTransition {
                from: self.state,
                to: BattleState::Searching,
            });
        }
        if let Some(feed) = &self.feed {
            if !feed.is_simulated() {
                if let Err(e) = feed.request_rematch() {
                    tracing::debug!("Rematch request not delivered: {e}");
                }
            }
        }
        let name = self.display_name.clone();
        self.find_opponent(&name).await
    }

    pub fn type_char(&mut self, c: char) {
        if !self.accepting_input() {
            return;
        }
        let Some(typing) = self.typing.as_mut() else {
            return;
        };
        typing.type_char(c);
        if typing.is_complete() {
            self.finish_round();
        }
    }

    pub fn backspace(&mut self) {
        if !self.accepting_input() {
            return;
        }
        if let Some(typing) = self.typing.as_mut() {
            typing.backspace();
        }
    }

    fn accepting_input(&self) -> bool {
        self.state == BattleState::Playing && !self.submitted
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Wait for and apply the next event. Returns `None` straight away when
    /// nothing is left that could produce one (no feed, no timers).
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        let event = match self.events_rx.try_recv() {
            Ok(event) => event,
            Err(_) if self.is_quiet() => return None,
            Err(_) => self.events_rx.recv().await?,
        };
        self.handle(event.clone());
        Some(event)
    }

    fn is_quiet(&self) -> bool {
        self.feed.is_none() && self.sampler.is_none() && self.clock.is_none()
    }

    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Server(msg) => self.on_server(msg),
            ControllerEvent::SampleTick => self.sample(),
            ControllerEvent::ClockTick => {
                self.seconds_left = self.seconds_left.saturating_sub(1);
                if self.seconds_left == 0 {
                    self.finish_round();
                }
            }
            ControllerEvent::FeedClosed => {
                if self.advance(BattleState::Disconnected) {
                    tracing::warn!("Lost the battle connection");
                    self.teardown();
                }
            }
        }
    }

    fn on_server(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Waiting(waiting) => {
                if self.state == BattleState::Searching {
                    self.queue_position = Some(waiting.position);
                }
            }
            ServerMessage::Matched(matched) => {
                if !self.advance(BattleState::Matched) {
                    return;
                }
                tracing::info!(
                    room = %matched.room_id,
                    opponent = %matched.opponent.display_name,
                    "Matched"
                );
                self.typing = Some(TypingSession::new(&matched.passage));
                self.room_id = Some(matched.room_id);
                self.passage = Some(matched.passage);
                self.opponent = Some(matched.opponent);
                self.search_started = None;
            }
            ServerMessage::Countdown(countdown) => {
                if self.advance(BattleState::Countdown) {
                    self.countdown = Some(countdown.count);
                }
            }
            ServerMessage::GameStart(_) => {
                if !self.advance(BattleState::Playing) {
                    return;
                }
                self.countdown = None;
                self.started_at = Some(Instant::now());
                self.seconds_left = self.config.round.as_secs() as u32;
                self.sampler = Some(TimerGuard::every(
                    self.config.sample_every,
                    self.events_tx.clone(),
                    ControllerEvent::SampleTick,
                ));
                self.clock = Some(TimerGuard::every(
                    CLOCK_STEP,
                    self.events_tx.clone(),
                    ControllerEvent::ClockTick,
                ));
            }
            ServerMessage::OpponentProgress(progress) => {
                if self.state == BattleState::Playing {
                    self.opponent_progress = Some(progress);
                }
            }
            ServerMessage::OpponentFinished(result) => {
                if self.state == BattleState::Playing {
                    self.opponent_result = Some(result);
                }
            }
            ServerMessage::GameOver(result) => {
                if self.result.is_some() || !self.advance(BattleState::Finished) {
                    return;
                }
                self.stop_timers();
                tracing::info!(
                    winner = result.winner.as_deref().unwrap_or("draw"),
                    wpm_diff = result.margin.wpm_diff,
                    "Battle over"
                );
                self.record(&result);
                self.result = Some(result);
            }
            ServerMessage::OpponentLeft => {
                self.opponent_left = true;
                if self.advance(BattleState::Disconnected) {
                    tracing::info!("Opponent left the battle");
                    self.teardown();
                }
            }
            ServerMessage::RematchRequested(request) => {
                self.rematch_requested_by = Some(request.by);
            }
            ServerMessage::Error(error) => {
                tracing::warn!("Server error: {}", error.message);
                self.last_error = Some(error.message);
            }
        }
    }

    /// Move along the transition table. Out-of-order events are dropped.
    fn advance(&mut self, to: BattleState) -> bool {
        if !self.state.allows(to) {
            tracing::debug!(from = %self.state, to = %to, "Ignoring out-of-order event");
            return false;
        }
        self.state = to;
        true
    }

    fn check(&self, to: BattleState) -> Result<(), ClientError> {
        if self.state.allows(to) {
            Ok(())
        } else {
            Err(ClientError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn elapsed(&self) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |t| t.elapsed().min(self.config.round))
    }

    fn sample(&mut self) {
        if !self.accepting_input() {
            return;
        }
        let Some(typing) = &self.typing else {
            return;
        };
        let update = typing.sample(self.elapsed());
        self.my_progress = Some(update);
        if let Some(feed) = &self.feed {
            if let Err(e) = feed.submit_progress(update) {
                tracing::debug!("Progress sample not delivered: {e}");
            }
        }
    }

    /// Submit the final result once, on completion or when the clock runs out.
    fn finish_round(&mut self) {
        if !self.accepting_input() {
            return;
        }
        let elapsed = self.elapsed();
        let Some(typing) = &self.typing else {
            return;
        };
        let report = typing.final_report(elapsed);
        self.my_progress = Some(typing.sample(elapsed));
        self.submitted = true;
        self.stop_timers();
        tracing::info!(wpm = report.wpm, accuracy = report.accuracy, "Round finished");
        if let Some(feed) = &self.feed {
            if let Err(e) = feed.submit_finished(report) {
                tracing::debug!("Final result not delivered: {e}");
            }
        }
    }

    fn record(&mut self, result: &BattleResult) {
        let (Some(ledger), Some(feed)) = (self.ledger.as_mut(), self.feed.as_ref()) else {
            return;
        };
        let Some(attempt) = CompletedAttempt::from_result(result, feed.player_id()) else {
            tracing::warn!("Battle result does not name this player, not recording it");
            return;
        };
        self.prior_best_wpm = Some(ledger.prior_best_wpm());
        ledger.record_attempt(&attempt);
        self.last_attempt = Some(attempt);
    }

    // ── Teardown ─────────────────────────────────────────────────────

    fn stop_timers(&mut self) {
        self.sampler = None;
        self.clock = None;
    }

    /// Cancel every timer, let go of the feed and swap in a fresh event
    /// channel so late events from either are never seen.
    fn teardown(&mut self) {
        self.stop_timers();
        if let Some(feed) = self.feed.take() {
            if let Err(e) = feed.leave() {
                tracing::debug!("Leave not delivered: {e}");
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.events_tx = tx;
        self.events_rx = rx;
    }

    fn reset_match(&mut self) {
        self.search_started = None;
        self.queue_position = None;
        self.room_id = None;
        self.passage = None;
        self.opponent = None;
        self.countdown = None;
        self.seconds_left = self.config.round.as_secs() as u32;
        self.typing = None;
        self.started_at = None;
        self.submitted = false;
        self.my_progress = None;
        self.opponent_progress = None;
        self.opponent_result = None;
        self.opponent_left = false;
        self.result = None;
        self.rematch_requested_by = None;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::client::bot::BOT_PLAYER_ID;
    use crate::client::simulated::LOCAL_PLAYER_ID;
    use crate::stats::{BattleHistory, BattleOutcome, StatsReader};

    fn offline(seed: u64) -> BattleController {
        BattleController::new(ControllerConfig {
            seed: Some(seed),
            ..ControllerConfig::default()
        })
    }

    async fn run_until(ctl: &mut BattleController, state: BattleState) -> Vec<ControllerEvent> {
        let mut seen = Vec::new();
        while ctl.state() != state {
            let event = ctl.next_event().await.expect("controller went quiet");
            seen.push(event);
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_battle_win_is_recorded() {
        let history = Arc::new(Mutex::new(BattleHistory::new()));
        let mut ctl = offline(11).with_ledger(history.clone());

        ctl.find_opponent("Ada").await.unwrap();
        assert_eq!(ctl.state(), BattleState::Searching);
        assert!(ctl.is_simulated());

        let seen = run_until(&mut ctl, BattleState::Playing).await;
        let counts: Vec<u8> = seen
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::Server(ServerMessage::Countdown(c)) => Some(c.count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![3, 2, 1, 0]);
        assert_eq!(ctl.opponent().unwrap().id, BOT_PLAYER_ID);

        // Five seconds for the whole passage is far beyond any bot pace.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let passage = ctl.passage().unwrap().to_string();
        for c in passage.chars() {
            ctl.type_char(c);
        }
        assert!(ctl.has_submitted());
        assert_eq!(ctl.state(), BattleState::Playing, "waits for game_over");

        run_until(&mut ctl, BattleState::Finished).await;
        let result = ctl.result().unwrap();
        assert_eq!(result.winner.as_deref(), Some(LOCAL_PLAYER_ID));

        let attempt = ctl.last_attempt().unwrap();
        assert_eq!(attempt.outcome, BattleOutcome::Win);
        assert_eq!(attempt.duration, Duration::from_secs(5));
        assert_eq!(ctl.prior_best_wpm(), Some(0.0));
        assert_eq!(history.lock().unwrap().current_win_streak(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_runs_out_and_submits() {
        let mut ctl = offline(3);
        ctl.find_opponent("Idle Hands").await.unwrap();
        run_until(&mut ctl, BattleState::Playing).await;
        assert_eq!(ctl.seconds_left(), 60);

        ctl.type_char('!');
        run_until(&mut ctl, BattleState::Finished).await;

        assert!(ctl.has_submitted());
        assert_eq!(ctl.seconds_left(), 0);
        let result = ctl.result().unwrap();
        assert_eq!(result.winner.as_deref(), Some(BOT_PLAYER_ID));
        assert_eq!(result.players[LOCAL_PLAYER_ID].completion_time, 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_reports_progress() {
        let mut ctl = offline(5);
        ctl.find_opponent("Ada").await.unwrap();
        run_until(&mut ctl, BattleState::Playing).await;

        let passage = ctl.passage().unwrap().to_string();
        for c in passage.chars().take(10) {
            ctl.type_char(c);
        }
        ctl.type_char('\u{1}');
        ctl.backspace();
        while ctl.my_progress().is_none() {
            ctl.next_event().await.unwrap();
        }
        let sample = ctl.my_progress().unwrap();
        assert_eq!(sample.char_index, 10);
        assert_eq!(sample.current_accuracy, 100.0);
        assert_eq!(ctl.typing().unwrap().errors(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_respect_state_table() {
        let mut ctl = offline(1);
        assert!(matches!(
            ctl.request_rematch().await,
            Err(ClientError::InvalidTransition {
                from: BattleState::Idle,
                to: BattleState::Searching
            })
        ));

        ctl.type_char('x');
        assert!(ctl.typing().is_none());

        ctl.find_opponent("Ada").await.unwrap();
        assert!(ctl.find_opponent("Ada").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_search_goes_quiet() {
        let mut ctl = offline(2);
        ctl.find_opponent("Ada").await.unwrap();
        ctl.cancel_search();
        assert_eq!(ctl.state(), BattleState::Idle);
        assert_eq!(ctl.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opponent_left_disconnects() {
        let mut ctl = offline(4);
        ctl.find_opponent("Ada").await.unwrap();
        run_until(&mut ctl, BattleState::Playing).await;

        ctl.handle(ControllerEvent::Server(ServerMessage::OpponentLeft));
        assert_eq!(ctl.state(), BattleState::Disconnected);
        assert!(ctl.opponent_left());
        // Timers and feed are gone; late ticks can no longer arrive.
        assert_eq!(ctl.next_event().await, None);
        ctl.type_char('a');
        assert!(!ctl.has_submitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rematch_starts_a_new_search() {
        let mut ctl = offline(8);
        ctl.find_opponent("Ada").await.unwrap();
        run_until(&mut ctl, BattleState::Playing).await;
        let passage = ctl.passage().unwrap().to_string();
        tokio::time::sleep(Duration::from_secs(5)).await;
        for c in passage.chars() {
            ctl.type_char(c);
        }
        run_until(&mut ctl, BattleState::Finished).await;

        ctl.request_rematch().await.unwrap();
        assert_eq!(ctl.state(), BattleState::Searching);
        assert!(ctl.result().is_none());
        assert!(ctl.room_id().is_none());
        assert!(!ctl.has_submitted());

        run_until(&mut ctl, BattleState::Matched).await;
        assert!(ctl.room_id().is_some());
        assert_eq!(ctl.typing().unwrap().char_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_events_are_ignored() {
        let mut ctl = offline(6);
        ctl.handle(ControllerEvent::Server(ServerMessage::GameStart(
            crate::protocol::GameStart { start_time: 0 },
        )));
        assert_eq!(ctl.state(), BattleState::Idle);
        ctl.handle(ControllerEvent::FeedClosed);
        assert_eq!(ctl.state(), BattleState::Idle);
        ctl.handle(ControllerEvent::Server(ServerMessage::error("room is full")));
        assert_eq!(ctl.last_error(), Some("room is full"));
    }
}
