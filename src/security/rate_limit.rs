//! Fixed-window request rate limiting keyed by caller identifier

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Prune pass is triggered once the window map grows past this many entries
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    window_start: Instant,
    count: u32,
}

/// Fixed-window rate limiter
///
/// Each identifier gets an independent window of `window` duration. The
/// first request in a window resets the counter; once `max_requests` have
/// been admitted, further requests are denied until the window rolls over.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, WindowSlot>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Returns true if the request is admitted under the current window
    pub fn check(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut slot = self
            .windows
            .entry(identifier.to_string())
            .or_insert(WindowSlot {
                window_start: now,
                count: 0,
            });

        if now.duration_since(slot.window_start) >= self.window {
            slot.window_start = now;
            slot.count = 0;
        }

        let admitted = slot.count < self.max_requests;
        if admitted {
            slot.count += 1;
        }
        drop(slot);

        if self.windows.len() > PRUNE_THRESHOLD {
            self.prune_expired();
        }

        admitted
    }

    /// Removes windows that have fully elapsed
    pub fn prune_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, slot| now.duration_since(slot.window_start) < self.window);
    }

    /// Number of identifiers currently tracked
    pub fn tracked_identifiers(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_max_then_denies() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check("caller"));
        }
        assert!(!limiter.check("caller"));
        assert!(!limiter.check("caller"));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
        assert_eq!(limiter.tracked_identifiers(), 2);
    }

    #[test]
    fn test_window_rolls_over_after_elapse() {
        let limiter = RateLimiter::new(2, Duration::from_millis(20));
        assert!(limiter.check("caller"));
        assert!(limiter.check("caller"));
        assert!(!limiter.check("caller"));

        std::thread::sleep(Duration::from_millis(30));

        assert!(limiter.check("caller"));
    }

    #[test]
    fn test_prune_removes_elapsed_windows() {
        let limiter = RateLimiter::new(2, Duration::from_millis(10));
        limiter.check("old");
        std::thread::sleep(Duration::from_millis(20));
        limiter.check("fresh");
        limiter.prune_expired();
        assert_eq!(limiter.tracked_identifiers(), 1);
    }
}
