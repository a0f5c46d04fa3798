//! Minimum-interval scheduling for external calls.

use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Spaces consecutive calls at least `min_interval` apart.
///
/// Taking `&mut self` keeps one caller at a time: the rate ceiling is global,
/// so there is exactly one limiter per fetch run.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
    calls: u64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
            calls: 0,
        }
    }

    /// Waits until the next call is allowed, then claims the slot.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_call {
            let ready_at = last + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                trace!(wait_ms = (ready_at - now).as_millis() as u64, "Rate limit wait");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last_call = Some(Instant::now());
        self.calls += 1;
    }

    /// Number of slots handed out so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}
