// Results recording seams and a local battle history behind them.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::protocol::{BattleResult, PlayerOutcome};

/// Oldest records are dropped past this many.
pub const MAX_RECORDS: usize = 100;
const RECENT_BATTLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleOutcome {
    Win,
    Lose,
    Draw,
}

/// One finished battle as seen by the local player.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedAttempt {
    pub wpm: f64,
    pub accuracy: f64,
    pub errors: u32,
    pub chars_typed: u32,
    pub duration: Duration,
    pub opponent_name: String,
    pub opponent_wpm: f64,
    pub opponent_accuracy: f64,
    pub outcome: BattleOutcome,
}

impl CompletedAttempt {
    /// Read the local player's view out of a broadcast result. `None` when
    /// either side is missing from it.
    pub fn from_result(result: &BattleResult, my_id: &str) -> Option<Self> {
        let me = result.players.get(my_id)?;
        let opponent: &PlayerOutcome = result.players.values().find(|p| p.player_id != my_id)?;
        let outcome = match result.winner.as_deref() {
            None => BattleOutcome::Draw,
            Some(winner) if winner == my_id => BattleOutcome::Win,
            Some(_) => BattleOutcome::Lose,
        };
        Some(Self {
            wpm: me.wpm,
            accuracy: me.accuracy,
            errors: me.errors,
            chars_typed: me.chars_typed,
            duration: Duration::from_millis(me.completion_time),
            opponent_name: opponent.display_name.clone(),
            opponent_wpm: opponent.wpm,
            opponent_accuracy: opponent.accuracy,
            outcome,
        })
    }
}

/// Accepts completed attempts. Nothing it returns feeds back into a battle.
pub trait ResultsRecorder {
    fn record_attempt(&mut self, attempt: &CompletedAttempt);
}

/// Prior performance, read before an attempt is recorded.
pub trait StatsReader {
    fn prior_best_wpm(&self) -> f64;
    fn current_win_streak(&self) -> u32;
}

/// Both seams in one object, as the controller holds them.
pub trait BattleLedger: ResultsRecorder + StatsReader + Send {}

impl<T: ResultsRecorder + StatsReader + Send> BattleLedger for T {}

impl<T: ResultsRecorder> ResultsRecorder for Arc<Mutex<T>> {
    fn record_attempt(&mut self, attempt: &CompletedAttempt) {
        self.lock().unwrap().record_attempt(attempt);
    }
}

impl<T: StatsReader> StatsReader for Arc<Mutex<T>> {
    fn prior_best_wpm(&self) -> f64 {
        self.lock().unwrap().prior_best_wpm()
    }

    fn current_win_streak(&self) -> u32 {
        self.lock().unwrap().current_win_streak()
    }
}

// ── Local history ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub my_wpm: f64,
    pub my_accuracy: f64,
    pub opponent_wpm: f64,
    pub opponent_accuracy: f64,
    pub opponent_name: String,
    pub result: BattleOutcome,
    /// Own wpm minus the opponent's; negative on a loss.
    pub wpm_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleStats {
    pub total_battles: usize,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    /// Percentage, 0 to 100.
    pub win_rate: f64,
    pub best_wpm: f64,
    pub avg_wpm: f64,
    pub best_accuracy: f64,
    pub avg_accuracy: f64,
    pub current_win_streak: u32,
    pub longest_win_streak: u32,
    /// Newest first.
    pub recent_battles: Vec<BattleRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalBests {
    pub best_wpm: f64,
    pub best_accuracy: f64,
    pub longest_win_streak: u32,
}

/// FIFO of the most recent battles, persisted as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct BattleHistory {
    records: VecDeque<BattleRecord>,
}

impl BattleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty history.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let mut records: VecDeque<BattleRecord> = serde_json::from_str(&data)?;
        while records.len() > MAX_RECORDS {
            records.pop_front();
        }
        tracing::debug!(path = %path.display(), records = records.len(), "Loaded battle history");
        Ok(Self { records })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), HistoryError> {
        let data = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn push(&mut self, record: BattleRecord) {
        self.records.push_back(record);
        if self.records.len() > MAX_RECORDS {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Newest first, optionally truncated.
    pub fn history(&self, limit: Option<usize>) -> Vec<BattleRecord> {
        let newest_first = self.records.iter().rev().cloned();
        match limit {
            Some(n) => newest_first.take(n).collect(),
            None => newest_first.collect(),
        }
    }

    fn current_streak(&self) -> u32 {
        self.records
            .iter()
            .rev()
            .take_while(|r| r.result == BattleOutcome::Win)
            .count() as u32
    }

    fn longest_streak(&self) -> u32 {
        let mut longest = 0;
        let mut current = 0;
        for record in &self.records {
            if record.result == BattleOutcome::Win {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 0;
            }
        }
        longest
    }

    fn best(&self, field: impl Fn(&BattleRecord) -> f64) -> f64 {
        self.records.iter().map(field).fold(0.0, f64::max)
    }

    pub fn stats(&self) -> BattleStats {
        let total = self.records.len();
        let count = |outcome| self.records.iter().filter(|r| r.result == outcome).count();
        let wins = count(BattleOutcome::Win);
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };

        BattleStats {
            total_battles: total,
            wins,
            losses: count(BattleOutcome::Lose),
            draws: count(BattleOutcome::Draw),
            win_rate: mean(wins as f64 * 100.0),
            best_wpm: self.best(|r| r.my_wpm),
            avg_wpm: mean(self.records.iter().map(|r| r.my_wpm).sum()),
            best_accuracy: self.best(|r| r.my_accuracy),
            avg_accuracy: mean(self.records.iter().map(|r| r.my_accuracy).sum()),
            current_win_streak: self.current_streak(),
            longest_win_streak: self.longest_streak(),
            recent_battles: self.history(Some(RECENT_BATTLES)),
        }
    }

    pub fn personal_bests(&self) -> PersonalBests {
        PersonalBests {
            best_wpm: self.best(|r| r.my_wpm),
            best_accuracy: self.best(|r| r.my_accuracy),
            longest_win_streak: self.longest_streak(),
        }
    }
}

impl ResultsRecorder for BattleHistory {
    fn record_attempt(&mut self, attempt: &CompletedAttempt) {
        let now = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.push(BattleRecord {
            id: format!("{}-{}", now.timestamp_millis(), &suffix[..9]),
            timestamp: now,
            my_wpm: attempt.wpm,
            my_accuracy: attempt.accuracy,
            opponent_wpm: attempt.opponent_wpm,
            opponent_accuracy: attempt.opponent_accuracy,
            opponent_name: attempt.opponent_name.clone(),
            result: attempt.outcome,
            wpm_diff: attempt.wpm - attempt.opponent_wpm,
        });
    }
}

impl StatsReader for BattleHistory {
    fn prior_best_wpm(&self) -> f64 {
        self.best(|r| r.my_wpm)
    }

    fn current_win_streak(&self) -> u32 {
        self.current_streak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::protocol::Margin;

    fn attempt(wpm: f64, outcome: BattleOutcome) -> CompletedAttempt {
        CompletedAttempt {
            wpm,
            accuracy: 95.0,
            errors: 1,
            chars_typed: 80,
            duration: Duration::from_secs(40),
            opponent_name: "SwiftFingers".into(),
            opponent_wpm: 50.0,
            opponent_accuracy: 97.0,
            outcome,
        }
    }

    fn outcome(id: &str, name: &str, wpm: f64, winner: bool) -> PlayerOutcome {
        PlayerOutcome {
            player_id: id.into(),
            display_name: name.into(),
            wpm,
            accuracy: 96.0,
            errors: 0,
            chars_typed: 70,
            completion_time: 30_000,
            is_winner: winner,
        }
    }

    #[test]
    fn test_attempt_from_result() {
        let mut players = BTreeMap::new();
        players.insert("me".to_string(), outcome("me", "Me", 62.0, true));
        players.insert("bot".to_string(), outcome("bot", "FlashKeys", 48.0, false));
        let result = BattleResult {
            winner: Some("me".into()),
            players,
            margin: Margin {
                wpm_diff: 14.0,
                accuracy_diff: 0.0,
            },
        };

        let a = CompletedAttempt::from_result(&result, "me").unwrap();
        assert_eq!(a.outcome, BattleOutcome::Win);
        assert_eq!(a.opponent_name, "FlashKeys");
        assert_eq!(a.duration, Duration::from_secs(30));

        let b = CompletedAttempt::from_result(&result, "bot").unwrap();
        assert_eq!(b.outcome, BattleOutcome::Lose);
        assert!(CompletedAttempt::from_result(&result, "stranger").is_none());
    }

    #[test]
    fn test_history_is_capped_fifo() {
        let mut history = BattleHistory::new();
        for i in 0..(MAX_RECORDS + 5) {
            history.record_attempt(&attempt(i as f64, BattleOutcome::Lose));
        }
        assert_eq!(history.len(), MAX_RECORDS);
        let newest = history.history(Some(1));
        assert_eq!(newest[0].my_wpm, (MAX_RECORDS + 4) as f64);
        let all = history.history(None);
        assert_eq!(all.last().unwrap().my_wpm, 5.0, "oldest five were dropped");
    }

    #[test]
    fn test_stats_and_streaks() {
        let mut history = BattleHistory::new();
        for (wpm, outcome) in [
            (40.0, BattleOutcome::Win),
            (45.0, BattleOutcome::Win),
            (50.0, BattleOutcome::Win),
            (42.0, BattleOutcome::Lose),
            (60.0, BattleOutcome::Win),
            (55.0, BattleOutcome::Draw),
            (70.0, BattleOutcome::Win),
            (65.0, BattleOutcome::Win),
        ] {
            history.record_attempt(&attempt(wpm, outcome));
        }

        let stats = history.stats();
        assert_eq!(stats.total_battles, 8);
        assert_eq!(stats.wins, 6);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.draws, 1);
        assert_eq!(stats.win_rate, 75.0);
        assert_eq!(stats.best_wpm, 70.0);
        assert_eq!(stats.avg_wpm, 53.375);
        assert_eq!(stats.current_win_streak, 2);
        assert_eq!(stats.longest_win_streak, 3);
        assert_eq!(stats.recent_battles[0].my_wpm, 65.0);
        assert_eq!(stats.recent_battles[0].wpm_diff, 15.0);

        assert_eq!(history.prior_best_wpm(), 70.0);
        assert_eq!(history.current_win_streak(), 2);
        assert_eq!(history.personal_bests().longest_win_streak, 3);
    }

    #[test]
    fn test_empty_stats() {
        let stats = BattleHistory::new().stats();
        assert_eq!(stats.total_battles, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.best_wpm, 0.0);
        assert!(stats.recent_battles.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battles.json");

        assert!(BattleHistory::load(&path).unwrap().is_empty());

        let mut history = BattleHistory::new();
        history.record_attempt(&attempt(58.0, BattleOutcome::Win));
        history.save(&path).unwrap();

        let loaded = BattleHistory::load(&path).unwrap();
        assert_eq!(loaded.history(None), history.history(None));

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"opponentName\""));
        assert!(json.contains("\"result\": \"win\""));
    }

    #[test]
    fn test_shared_history_implements_ledger() {
        let shared = Arc::new(Mutex::new(BattleHistory::new()));
        let mut ledger: Box<dyn BattleLedger> = Box::new(shared.clone());
        ledger.record_attempt(&attempt(33.0, BattleOutcome::Win));
        assert_eq!(ledger.prior_best_wpm(), 33.0);
        assert_eq!(shared.lock().unwrap().len(), 1);
    }
}
