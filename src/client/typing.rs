// Local typing buffer and the live metrics sampled from it.

use std::time::Duration;

use crate::protocol::{FinishReport, ProgressUpdate};

/// Elapsed time is floored here so the first samples do not explode.
const MIN_ELAPSED_MINUTES: f64 = 0.01;

/// What the learner has typed so far against the canonical passage.
#[derive(Debug, Clone)]
pub struct TypingSession {
    passage: Vec<char>,
    typed: Vec<char>,
    errors: u32,
}

impl TypingSession {
    pub fn new(passage: &str) -> Self {
        Self {
            passage: passage.chars().collect(),
            typed: Vec::new(),
            errors: 0,
        }
    }

    /// Append one keystroke. A mismatch against the passage at that
    /// position counts as an error for good, even if it is later deleted.
    pub fn type_char(&mut self, c: char) {
        let pos = self.typed.len();
        let Some(&expected) = self.passage.get(pos) else {
            return;
        };
        if c != expected {
            self.errors += 1;
        }
        self.typed.push(c);
    }

    pub fn backspace(&mut self) {
        self.typed.pop();
    }

    pub fn char_index(&self) -> usize {
        self.typed.len()
    }

    pub fn total_chars(&self) -> usize {
        self.passage.len()
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn correct_chars(&self) -> usize {
        self.typed
            .iter()
            .zip(&self.passage)
            .filter(|(typed, expected)| typed == expected)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        !self.passage.is_empty() && self.typed.len() == self.passage.len()
    }

    /// Words per minute, rounded, with a word being five correct characters.
    pub fn wpm(&self, elapsed: Duration) -> f64 {
        let minutes = (elapsed.as_secs_f64() / 60.0).max(MIN_ELAPSED_MINUTES);
        ((self.correct_chars() as f64 / 5.0) / minutes).round()
    }

    /// Share of typed characters that are correct, to one decimal place.
    pub fn accuracy(&self) -> f64 {
        if self.typed.is_empty() {
            return 100.0;
        }
        let raw = self.correct_chars() as f64 / self.typed.len() as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }

    pub fn sample(&self, elapsed: Duration) -> ProgressUpdate {
        let total = self.total_chars();
        let progress = if total == 0 {
            0.0
        } else {
            self.char_index() as f64 / total as f64 * 100.0
        };
        ProgressUpdate {
            char_index: self.char_index() as u32,
            total_chars: total as u32,
            progress,
            current_wpm: self.wpm(elapsed),
            current_accuracy: self.accuracy(),
        }
    }

    pub fn final_report(&self, elapsed: Duration) -> FinishReport {
        FinishReport {
            wpm: self.wpm(elapsed),
            accuracy: self.accuracy(),
            errors: self.errors,
            chars_typed: self.char_index() as u32,
            completion_time: elapsed.as_millis() as u64,
        }
    }
}
