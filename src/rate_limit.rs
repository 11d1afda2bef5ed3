use std::time::{Duration, Instant};

/// Lets an event through at most once per window.
///
/// Used to keep a flapping link from flooding the log with the same
/// "device not available" line.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        RateLimiter { window, last: None }
    }

    /// True if the event may be emitted now; records the emission.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
