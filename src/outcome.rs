// Winner determination for a two-player battle.
//
// Shared by the server room and the simulated (bot) opponent so both paths
// present identical results.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::protocol::{BattleResult, FinalResult, Margin, PlayerOutcome};

/// Completion time assumed for a player who never reported a result.
pub const DEFAULT_COMPLETION_MS: u64 = 60_000;

/// One side of a battle as known when the round ends.
#[derive(Debug, Clone, Copy)]
pub struct Contestant<'a> {
    pub player_id: &'a str,
    pub display_name: &'a str,
    pub result: Option<&'a FinalResult>,
}

impl Contestant<'_> {
    fn outcome(&self) -> PlayerOutcome {
        let r = self.result;
        PlayerOutcome {
            player_id: self.player_id.to_string(),
            display_name: self.display_name.to_string(),
            wpm: r.map_or(0.0, |r| r.wpm),
            accuracy: r.map_or(0.0, |r| r.accuracy),
            errors: r.map_or(0, |r| r.errors),
            chars_typed: r.map_or(0, |r| r.chars_typed),
            completion_time: r.map_or(DEFAULT_COMPLETION_MS, |r| r.completion_time),
            is_winner: false,
        }
    }
}

/// Rank by wpm descending, then accuracy descending.
fn rank(a: &PlayerOutcome, b: &PlayerOutcome) -> Ordering {
    b.wpm
        .total_cmp(&a.wpm)
        .then_with(|| b.accuracy.total_cmp(&a.accuracy))
}

/// Compute the result of a finished two-player round. Missing results count
/// as zero wpm and accuracy.
pub fn decide(contestants: [Contestant<'_>; 2]) -> BattleResult {
    let mut ranked = contestants.map(|c| c.outcome());
    ranked.sort_by(rank);

    let [first, second] = &mut ranked;
    let tie = first.wpm == second.wpm && first.accuracy == second.accuracy;
    let winner = if tie {
        None
    } else {
        first.is_winner = true;
        Some(first.player_id.clone())
    };

    let margin = Margin {
        wpm_diff: (first.wpm - second.wpm).abs(),
        accuracy_diff: (first.accuracy - second.accuracy).abs(),
    };

    let players: BTreeMap<_, _> = ranked
        .into_iter()
        .map(|p| (p.player_id.clone(), p))
        .collect();

    BattleResult {
        winner,
        players,
        margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, wpm: f64, accuracy: f64) -> FinalResult {
        FinalResult {
            player_id: id.to_string(),
            wpm,
            accuracy,
            errors: 1,
            chars_typed: 80,
            completion_time: 30_000,
        }
    }

    fn contest(a: &FinalResult, b: &FinalResult) -> BattleResult {
        decide([
            Contestant {
                player_id: &a.player_id,
                display_name: "A",
                result: Some(a),
            },
            Contestant {
                player_id: &b.player_id,
                display_name: "B",
                result: Some(b),
            },
        ])
    }

    #[test]
    fn test_higher_wpm_wins() {
        let a = result("a", 70.0, 98.0);
        let b = result("b", 55.0, 99.0);
        let r = contest(&a, &b);
        assert_eq!(r.winner.as_deref(), Some("a"));
        assert_eq!(r.margin.wpm_diff, 15.0);
        assert_eq!(r.margin.accuracy_diff, 1.0);
        assert!(r.players["a"].is_winner);
        assert!(!r.players["b"].is_winner);
    }

    #[test]
    fn test_order_of_arguments_does_not_matter() {
        let a = result("a", 40.0, 90.0);
        let b = result("b", 41.0, 80.0);
        assert_eq!(contest(&a, &b).winner.as_deref(), Some("b"));
        assert_eq!(contest(&b, &a).winner.as_deref(), Some("b"));
    }

    #[test]
    fn test_equal_wpm_higher_accuracy_wins() {
        let a = result("a", 60.0, 95.5);
        let b = result("b", 60.0, 97.0);
        let r = contest(&a, &b);
        assert_eq!(r.winner.as_deref(), Some("b"));
        assert_eq!(r.margin.wpm_diff, 0.0);
        assert_eq!(r.margin.accuracy_diff, 1.5);
    }

    #[test]
    fn test_exact_tie_is_a_draw() {
        let a = result("a", 60.0, 97.0);
        let b = result("b", 60.0, 97.0);
        let r = contest(&a, &b);
        assert_eq!(r.winner, None);
        assert_eq!(r.margin.wpm_diff, 0.0);
        assert_eq!(r.margin.accuracy_diff, 0.0);
        assert!(r.players.values().all(|p| !p.is_winner));
    }

    #[test]
    fn test_missing_results_use_defaults() {
        let a = result("a", 30.0, 90.0);
        let r = decide([
            Contestant {
                player_id: "a",
                display_name: "Alice",
                result: Some(&a),
            },
            Contestant {
                player_id: "b",
                display_name: "Bob",
                result: None,
            },
        ]);
        assert_eq!(r.winner.as_deref(), Some("a"));
        let bob = &r.players["b"];
        assert_eq!(bob.wpm, 0.0);
        assert_eq!(bob.accuracy, 0.0);
        assert_eq!(bob.chars_typed, 0);
        assert_eq!(bob.completion_time, DEFAULT_COMPLETION_MS);
        assert_eq!(bob.display_name, "Bob");
    }

    #[test]
    fn test_neither_reported_is_a_draw() {
        let r = decide([
            Contestant {
                player_id: "a",
                display_name: "A",
                result: None,
            },
            Contestant {
                player_id: "b",
                display_name: "B",
                result: None,
            },
        ]);
        assert_eq!(r.winner, None);
        assert_eq!(r.players.len(), 2);
    }
}
