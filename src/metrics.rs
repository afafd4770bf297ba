// Prometheus metrics definitions for the battle backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Rooms whose actor is still running (waiting, in play or lingering after finish).
    pub static ref ACTIVE_ROOMS: IntGauge =
        IntGauge::new("battle_active_rooms", "Rooms currently alive").unwrap();

    /// Players waiting in the matchmaking queue.
    pub static ref QUEUE_DEPTH: IntGauge =
        IntGauge::new("battle_queue_depth", "Players waiting to be matched").unwrap();

    /// Live WebSocket connections (matchmaker and rooms).
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("battle_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    pub static ref MATCHES_CREATED_TOTAL: IntCounter = IntCounter::new(
        "battle_matches_created_total",
        "Pairs formed by the matchmaker",
    )
    .unwrap();

    /// Completed rounds, by outcome (win, draw).
    pub static ref GAMES_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("battle_games_completed_total", "Rounds that reached game_over"),
        &["outcome"],
    )
    .unwrap();

    pub static ref GAMES_ABANDONED_TOTAL: IntCounter = IntCounter::new(
        "battle_games_abandoned_total",
        "Rounds ended by a disconnect before game_over",
    )
    .unwrap();

    /// Client frames the server dropped, by reason.
    pub static ref UPDATES_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("battle_updates_rejected_total", "Client frames dropped"),
        &["reason"],
    )
    .unwrap();

    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "battle_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Time from game_start to game_over, by how the round ended.
    pub static ref GAME_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("battle_game_duration_seconds", "Round duration in seconds")
            .buckets(vec![5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 61.0, 90.0]),
        &["ended_by"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_ROOMS.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(MATCHES_CREATED_TOTAL.clone()),
        Box::new(GAMES_COMPLETED_TOTAL.clone()),
        Box::new(GAMES_ABANDONED_TOTAL.clone()),
        Box::new(UPDATES_REJECTED_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(GAME_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Label for a dropped client frame.
pub fn rejection_reason(err: &crate::error::BattleError) -> &'static str {
    use crate::error::BattleError::*;
    match err {
        MalformedMessage(_) => "malformed",
        InvalidMetric { .. } => "wpm_cap",
        PrematureMessage { .. } => "premature",
        DuplicateResult => "duplicate",
        NotInRoom(_) => "not_in_room",
        RoomFull => "room_full",
        PeerDisconnected | AlreadyFinished | InvalidTransition { .. } => "state",
    }
}
