// Synthetic opponent that types at a random, slightly jittery pace.

use std::time::Duration;

use rand::Rng;

use crate::protocol::{FinalResult, PlayerId, TypingProgress};

/// The bot's fixed identity inside a simulated battle.
pub const BOT_PLAYER_ID: &str = "bot";

pub const TICK: Duration = Duration::from_millis(500);
pub const ROUND_BUDGET: Duration = Duration::from_secs(60);

const MIN_TARGET_WPM: f64 = 35.0;
const MAX_TARGET_WPM: f64 = 80.0;
const ERROR_CHANCE: f64 = 0.03;
const ACCURACY_FLOOR: f64 = 85.0;

fn floor1(v: f64) -> f64 {
    (v * 10.0).floor() / 10.0
}

#[derive(Debug, Clone)]
pub struct BotSimulator<R> {
    rng: R,
    target_wpm: f64,
    cursor: f64,
    errors: u32,
    total: usize,
    elapsed: Duration,
    last_wpm: Option<f64>,
}

impl<R: Rng> BotSimulator<R> {
    /// Start a bot for a passage of `total_chars`, drawing its pace from `rng`.
    pub fn new(total_chars: usize, mut rng: R) -> Self {
        let target_wpm = rng.gen_range(MIN_TARGET_WPM..MAX_TARGET_WPM);
        Self {
            rng,
            target_wpm,
            cursor: 0.0,
            errors: 0,
            total: total_chars,
            elapsed: Duration::ZERO,
            last_wpm: None,
        }
    }

    pub fn target_wpm(&self) -> f64 {
        self.target_wpm
    }

    pub fn char_index(&self) -> usize {
        self.cursor.floor() as usize
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.total as f64 || self.elapsed >= ROUND_BUDGET
    }

    /// Never below the floor, whatever the dice said.
    pub fn accuracy(&self) -> f64 {
        if self.cursor <= 0.0 {
            return 100.0;
        }
        let raw = (self.cursor - self.errors as f64) / self.cursor * 100.0;
        floor1(raw).max(ACCURACY_FLOOR)
    }

    /// Advance one 500 ms step and report where the bot is.
    pub fn tick(&mut self) -> TypingProgress {
        if !self.is_complete() {
            self.elapsed += TICK;
            let chars_per_second = self.target_wpm * 5.0 / 60.0;
            let jitter = (self.rng.gen::<f64>() - 0.3) * 2.0;
            self.cursor = (self.cursor + chars_per_second * TICK.as_secs_f64() + jitter)
                .clamp(0.0, self.total as f64);
            if self.rng.gen::<f64>() < ERROR_CHANCE {
                self.errors += 1;
            }
        }

        let current_wpm = (self.target_wpm + (self.rng.gen::<f64>() - 0.5) * 10.0).floor();
        self.last_wpm = Some(current_wpm);

        let progress = if self.total == 0 {
            100.0
        } else {
            (self.cursor / self.total as f64 * 100.0).min(100.0)
        };
        TypingProgress {
            player_id: PlayerId::from(BOT_PLAYER_ID),
            char_index: self.char_index() as u32,
            total_chars: self.total as u32,
            progress,
            current_wpm,
            current_accuracy: self.accuracy(),
            timestamp: crate::protocol::now_millis(),
        }
    }

    /// The bot's result from whatever state it reached.
    pub fn finish(&self) -> FinalResult {
        FinalResult {
            player_id: PlayerId::from(BOT_PLAYER_ID),
            wpm: self.last_wpm.unwrap_or_else(|| self.target_wpm.floor()),
            accuracy: self.accuracy(),
            errors: self.errors,
            chars_typed: self.char_index() as u32,
            completion_time: self.elapsed.min(ROUND_BUDGET).as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bot(seed: u64, total: usize) -> BotSimulator<StdRng> {
        BotSimulator::new(total, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_target_wpm_in_range() {
        for seed in 0..200 {
            let b = bot(seed, 100);
            assert!(b.target_wpm() >= 35.0 && b.target_wpm() < 80.0);
        }
    }

    #[test]
    fn test_full_round_stays_plausible() {
        for seed in 0..100 {
            let mut b = bot(seed, 90);
            let mut ticks = 0;
            while !b.is_complete() {
                let p = b.tick();
                assert!(p.current_accuracy >= 85.0);
                assert!(p.char_index <= 90);
                ticks += 1;
            }
            assert!(ticks <= 120, "60 s budget is 120 ticks");

            let result = b.finish();
            assert!(result.accuracy >= 85.0, "seed {seed}: {}", result.accuracy);
            assert!(result.chars_typed <= 90);
            assert!(result.completion_time <= 60_000);
            assert_eq!(result.player_id, BOT_PLAYER_ID);
        }
    }

    #[test]
    fn test_long_passage_ends_on_budget() {
        let mut b = bot(7, 100_000);
        for _ in 0..120 {
            b.tick();
        }
        assert!(b.is_complete());
        assert_eq!(b.finish().completion_time, 60_000);

        // Further ticks do not move the cursor.
        let before = b.char_index();
        b.tick();
        assert_eq!(b.char_index(), before);
    }

    #[test]
    fn test_accuracy_floor() {
        let mut b = bot(1, 50);
        b.cursor = 10.0;
        b.errors = 9;
        assert_eq!(b.accuracy(), 85.0);
        b.errors = 1;
        assert_eq!(b.accuracy(), 90.0);
    }

    #[test]
    fn test_current_wpm_jitter_is_bounded() {
        let mut b = bot(3, 500);
        for _ in 0..50 {
            let p = b.tick();
            assert!((p.current_wpm - b.target_wpm()).abs() <= 6.0);
        }
    }

    #[test]
    fn test_same_seed_same_bot() {
        let mut a = bot(42, 120);
        let mut b = bot(42, 120);
        for _ in 0..10 {
            assert_eq!(a.tick().char_index, b.tick().char_index);
        }
    }
}
