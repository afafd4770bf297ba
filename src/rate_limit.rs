// In-memory rate limiter for WebSocket frames.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Any inbound frame on one connection.
    Messages,
    /// `join_queue` requests on one matchmaker connection.
    QueueJoins,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::Messages => 40,
            RateLimitType::QueueJoins => 10,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        match self {
            RateLimitType::Messages => Duration::from_secs(1),
            RateLimitType::QueueJoins => Duration::from_secs(60),
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::Messages => write!(f, "messages per second"),
            RateLimitType::QueueJoins => write!(f, "queue joins per minute"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rate limit exceeded: max {} {}",
            self.max, self.limit_type
        )
    }
}

/// Key for the rate limit map: (connection id, limit type).
type LimitKey = (String, RateLimitType);

/// Thread-safe sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record one event for `conn_id` if it is within its limit.
    /// In local mode, rate limiting is always bypassed.
    pub fn check_limit(&self, conn_id: &str, limit_type: RateLimitType) -> Result<(), RateLimitError> {
        if crate::config::is_local_mode() {
            return Ok(());
        }
        let mut map = self.inner.lock().unwrap();
        let window = limit_type.window();
        let max = limit_type.max_count();
        let now = Instant::now();

        let entries = map
            .entry((conn_id.to_string(), limit_type))
            .or_insert_with(Vec::new);

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Drop all state for a closed connection.
    pub fn forget(&self, conn_id: &str) {
        let mut map = self.inner.lock().unwrap();
        map.retain(|(id, _), _| id != conn_id);
    }

    /// Current count for a connection and limit type (for tests and diagnostics).
    pub fn current_count(&self, conn_id: &str, limit_type: RateLimitType) -> usize {
        let mut map = self.inner.lock().unwrap();
        let window = limit_type.window();
        let now = Instant::now();

        match map.get_mut(&(conn_id.to_string(), limit_type)) {
            Some(entries) => {
                entries.retain(|t| now.duration_since(*t) < window);
                entries.len()
            }
            None => 0,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
