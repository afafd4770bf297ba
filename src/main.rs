use battle_backend::config::{self, Config};
use battle_backend::metrics;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    config::set_local_mode(config.local_mode);
    if config.local_mode {
        tracing::info!("Local mode enabled: rate limiting disabled");
    }
    metrics::register_metrics();

    let addr = config.listen_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {addr}: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        round_cap_secs = config.timing.round_cap.as_secs(),
        "Battle backend listening on {addr}"
    );
    if let Err(e) = battle_backend::serve(listener, &config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}
