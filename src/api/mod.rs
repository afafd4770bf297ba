// HTTP API routes (health, metrics, queue and room introspection, WebSockets).

pub mod ws;

use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::battle::RoomRegistry;
use crate::config::Config;
use crate::matchmaker::Matchmaker;
use crate::metrics;
use crate::rate_limit::RateLimiter;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub matchmaker: Matchmaker,
    pub rooms: RoomRegistry,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let rooms = RoomRegistry::new(config.timing);
        Self {
            matchmaker: Matchmaker::new(rooms.clone()),
            rooms,
            rate_limiter: RateLimiter::new(),
        }
    }
}

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_text))
        // Matchmaking
        .route("/api/queue/status", get(queue_status))
        // Rooms
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/{id}", get(get_room))
        // WebSocket
        .route("/ws/matchmaker", get(ws::ws_matchmaker))
        .route("/ws/battle/{room_id}", get(ws::ws_battle))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "battle-backend" }))
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.matchmaker.status();
    (StatusCode::OK, Json(json!(status))).into_response()
}

async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!(state.rooms.summaries()))).into_response()
}

async fn get_room(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.rooms.get(&id) {
        Some(room) => (StatusCode::OK, Json(json!(room.summary()))).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "room not found").into_response(),
    }
}
