use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Fixed-window limiter: at most one permit per `window`.
///
/// Not a token bucket. Rejected calls do not extend the window. State lives
/// in memory only and resets on restart.
pub struct RateLimiter {
    window: Duration,
    last_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_allowed: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claims the permit for the current window if it is still free.
    ///
    /// Returns `(true, 0)` on success, otherwise `(false, time until the
    /// window reopens)`.
    pub fn allow(&self) -> (bool, Duration) {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> (bool, Duration) {
        let mut last = self
            .last_allowed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.window => {
                let elapsed = now.saturating_duration_since(prev);
                (false, self.window - elapsed)
            }
            _ => {
                *last = Some(now);
                (true, Duration::ZERO)
            }
        }
    }
}
