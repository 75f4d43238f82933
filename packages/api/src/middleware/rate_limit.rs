//! Fixed-window request limiter keyed by user.

use moka::sync::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    windows: Cache<String, Arc<AtomicU32>>,
}

impl RateLimiter {
    /// At most `limit` hits per key in each `window`. The window starts at
    /// the first hit and its counter expires with it.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            windows: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(window)
                .build(),
        }
    }

    /// Count a hit for `key`; false once the window is exhausted.
    pub fn check(&self, key: &str) -> bool {
        let counter = self
            .windows
            .get_with(key.to_string(), || Arc::new(AtomicU32::new(0)));
        counter.fetch_add(1, Ordering::SeqCst) < self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_limit_hits_per_window_and_key() {
        let limiter = RateLimiter::new(3, Duration::from_secs(300));
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[test]
    fn window_expiry_resets_the_count() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check("a"));
    }
}
