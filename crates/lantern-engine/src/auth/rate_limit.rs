// Sliding-window rate limiter for authentication failures
//
// Per-client failure timestamps, in-memory and process-lifetime only. An
// explicit instance owned by the composition root, so tests can build and
// reset their own.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
pub const RATE_LIMIT_MAX_FAILURES: usize = 10;

pub struct RateLimiter {
    window: Duration,
    max_failures: usize,
    failures: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(RATE_LIMIT_WINDOW, RATE_LIMIT_MAX_FAILURES)
    }

    pub fn with_limits(window: Duration, max_failures: usize) -> Self {
        Self {
            window,
            max_failures,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Whether this client has exceeded the failure threshold within the
    /// window. Prunes expired entries as a side effect.
    pub fn is_limited(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.lock();
        match failures.get_mut(client_id) {
            Some(timestamps) => {
                timestamps.retain(|t| now.duration_since(*t) < self.window);
                timestamps.len() >= self.max_failures
            }
            None => false,
        }
    }

    /// Record a failed authentication attempt for this client.
    pub fn record_failure(&self, client_id: &str) {
        self.failures
            .lock()
            .entry(client_id.to_string())
            .or_default()
            .push(Instant::now());
    }

    /// Forget all recorded failures.
    pub fn reset(&self) {
        self.failures.lock().clear();
    }
}
