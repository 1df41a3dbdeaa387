use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Link liveness: connected while the last receipt is younger than `timeout`.
///
/// Uses the monotonic clock so wall-clock adjustments cannot flip the state.
#[derive(Debug)]
pub struct Liveness {
    timeout: Duration,
    last_seen: Mutex<Option<Instant>>,
}

impl Liveness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn record(&self, at: Instant) {
        let mut last = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(at);
    }

    pub fn last_seen(&self) -> Option<Instant> {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn age_at(&self, now: Instant) -> Option<Duration> {
        self.last_seen().map(|t| now.saturating_duration_since(t))
    }

    pub fn is_connected_at(&self, now: Instant) -> bool {
        match self.age_at(now) {
            Some(age) => age < self.timeout,
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected_at(Instant::now())
    }
}
