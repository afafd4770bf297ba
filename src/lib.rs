// Typing battle backend: matchmaking, authoritative rooms and the battle client.

pub mod api;
pub mod battle;
pub mod client;
pub mod config;
pub mod error;
pub mod matchmaker;
pub mod metrics;
pub mod outcome;
pub mod passages;
pub mod protocol;
pub mod rate_limit;
pub mod stats;

use tokio::net::TcpListener;

use crate::config::Config;

/// Build the full application router for `config`.
pub fn build_app(config: &Config) -> axum::Router {
    api::router(api::AppState::new(config))
}

/// Serve the application on an already-bound listener until the server stops.
pub async fn serve(listener: TcpListener, config: &Config) -> std::io::Result<()> {
    axum::serve(listener, build_app(config)).await
}
