// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

/// Timing of a battle round, as driven by the room actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleTiming {
    /// First countdown value; the room emits `from, from-1, ..., 0`.
    pub countdown_from: u8,
    /// Spacing between countdown frames.
    pub countdown_step: Duration,
    /// Pause between the final countdown frame and `game_start`.
    pub go_delay: Duration,
    /// Hard cap on a round, armed at `game_start`.
    pub round_cap: Duration,
    /// How long a finished room lingers (for rematch requests) before it is reaped.
    pub finished_ttl: Duration,
    /// How long a new room waits for both matched players to join before it
    /// is torn down.
    pub join_timeout: Duration,
}

impl Default for BattleTiming {
    fn default() -> Self {
        Self {
            countdown_from: 3,
            countdown_step: Duration::from_secs(1),
            go_delay: Duration::from_millis(400),
            round_cap: Duration::from_secs(61),
            finished_ttl: Duration::from_secs(120),
            join_timeout: Duration::from_secs(30),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind_addr: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Round timing handed to every room.
    pub timing: BattleTiming,
    /// Whether to run in local mode (no rate limiting).
    pub local_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            timing: BattleTiming::default(),
            local_mode: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `BIND_ADDR` - Interface to listen on (default: `0.0.0.0`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `BATTLE_ROUND_CAP_SECS` - Hard cap per round (default: 61)
    /// - `BATTLE_COUNTDOWN_STEP_MS` - Countdown spacing (default: 1000)
    /// - `BATTLE_GO_DELAY_MS` - Delay between countdown 0 and game start (default: 400)
    /// - `ROOM_TTL_SECS` - Lifetime of a finished room (default: 120)
    /// - `ROOM_JOIN_TIMEOUT_SECS` - Time allowed for both players to join (default: 30)
    /// - `BATTLE_LOCAL_MODE` - Set to `true` to disable rate limiting
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `BATTLE_LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let defaults = Config::default();

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env_parse("PORT"))
            .unwrap_or(defaults.port);

        let base = defaults.timing;
        let timing = BattleTiming {
            countdown_from: base.countdown_from,
            countdown_step: env_parse("BATTLE_COUNTDOWN_STEP_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.countdown_step),
            go_delay: env_parse("BATTLE_GO_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.go_delay),
            round_cap: env_parse("BATTLE_ROUND_CAP_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.round_cap),
            finished_ttl: env_parse("ROOM_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.finished_ttl),
            join_timeout: env_parse("ROOM_JOIN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.join_timeout),
        };

        let local_mode = args.contains(&"--local".to_string())
            || std::env::var("BATTLE_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        Config {
            bind_addr,
            port,
            timing,
            local_mode,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Parse a CLI flag value like `--port 8080`.
    pub fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Global flag indicating local mode is active.
/// This is set once at startup and read by the rate limiter.
static LOCAL_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Set the local mode flag (called once at startup).
pub fn set_local_mode(enabled: bool) {
    LOCAL_MODE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

/// Check if local mode is active.
pub fn is_local_mode() -> bool {
    LOCAL_MODE.load(std::sync::atomic::Ordering::Relaxed)
}
