// Headless battle client: queues up, types the passage at a fixed pace and
// prints the outcome.
//
// Usage:
//   battle-client [--server ws://127.0.0.1:3000] [--name Ada] [--wpm 60]
//                 [--history battle_history.json] [--seed 7]
//
// Without --server (or when the server cannot be reached) the match is
// played against the local bot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use battle_backend::client::{BattleController, BattleState, ControllerConfig, ControllerEvent};
use battle_backend::config::Config;
use battle_backend::protocol::ServerMessage;
use battle_backend::stats::BattleHistory;

fn arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    Config::parse_cli_value(args, flag).and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let server_url = Config::parse_cli_value(&args, "--server");
    let name = Config::parse_cli_value(&args, "--name").unwrap_or_else(|| "AutoTypist".into());
    let wpm: f64 = arg(&args, "--wpm").unwrap_or(60.0);
    let history_path =
        Config::parse_cli_value(&args, "--history").unwrap_or_else(|| "battle_history.json".into());

    let history = match BattleHistory::load(&history_path) {
        Ok(history) => Arc::new(Mutex::new(history)),
        Err(e) => {
            tracing::error!("Failed to load {history_path}: {e}");
            std::process::exit(1);
        }
    };

    let config = ControllerConfig {
        server_url,
        seed: arg(&args, "--seed"),
        ..ControllerConfig::default()
    };
    let mut ctl = BattleController::new(config).with_ledger(history.clone());

    if let Err(e) = ctl.find_opponent(&name).await {
        tracing::error!("Could not start a search: {e}");
        std::process::exit(1);
    }
    println!(
        "{name} is looking for an opponent{}",
        if ctl.is_simulated() { " (offline)" } else { "" }
    );

    // Five characters per word.
    let key_every = Duration::from_secs_f64(12.0 / wpm.max(1.0));
    let mut keys = tokio::time::interval(key_every);

    loop {
        let typing = ctl.state() == BattleState::Playing && !ctl.has_submitted();
        tokio::select! {
            event = ctl.next_event() => match event {
                Some(event) => report(&ctl, &event),
                None => break,
            },
            _ = keys.tick(), if typing => {
                let next = ctl
                    .typing()
                    .and_then(|t| ctl.passage()?.chars().nth(t.char_index()));
                if let Some(c) = next {
                    ctl.type_char(c);
                }
            }
        }
        if matches!(ctl.state(), BattleState::Finished | BattleState::Disconnected) {
            break;
        }
    }

    summarize(&ctl, &history);
    let saved = history.lock().unwrap().save(&history_path);
    if let Err(e) = saved {
        tracing::error!("Failed to save {history_path}: {e}");
        std::process::exit(1);
    }
}

fn report(ctl: &BattleController, event: &ControllerEvent) {
    let ControllerEvent::Server(msg) = event else {
        return;
    };
    match msg {
        ServerMessage::Waiting(w) => {
            println!("Waiting in queue at position {} ({} online)", w.position, w.players_online)
        }
        ServerMessage::Matched(m) => {
            println!("Matched against {} in {}", m.opponent.display_name, m.room_id);
            println!("Passage: {}", m.passage);
        }
        ServerMessage::Countdown(c) if c.count > 0 => println!("{}...", c.count),
        ServerMessage::GameStart(_) => println!("Go!"),
        ServerMessage::OpponentFinished(r) => {
            println!("Opponent finished at {} WPM, {}% accuracy", r.wpm, r.accuracy)
        }
        ServerMessage::OpponentLeft => println!("Opponent left the battle"),
        ServerMessage::RematchRequested(_) => println!("Opponent wants a rematch"),
        ServerMessage::Error(e) => println!("Server error: {}", e.message),
        _ => {}
    }
    if let Some(mine) = ctl.my_progress() {
        tracing::debug!(progress = mine.progress, wpm = mine.current_wpm, "Local progress");
    }
}

fn summarize(ctl: &BattleController, history: &Mutex<BattleHistory>) {
    let Some(attempt) = ctl.last_attempt() else {
        println!("No result recorded");
        return;
    };
    println!(
        "{:?}: {} WPM at {}% vs {} ({} WPM at {}%)",
        attempt.outcome,
        attempt.wpm,
        attempt.accuracy,
        attempt.opponent_name,
        attempt.opponent_wpm,
        attempt.opponent_accuracy
    );
    if ctl.prior_best_wpm().is_some_and(|best| attempt.wpm > best) {
        println!("New personal best!");
    }

    let stats = history.lock().unwrap().stats();
    println!(
        "{} battles, {:.0}% won, current streak {}, longest {}",
        stats.total_battles, stats.win_rate, stats.current_win_streak, stats.longest_win_streak
    );
}
