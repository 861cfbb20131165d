//! Per-user sliding-window admission control.
//!
//! Governs how often a user may *submit*; the queue's concurrency cap
//! independently governs how many transfers *run*. A user can be limited
//! while the queue is idle, and vice versa.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// How long until the oldest request leaves the window. Only set when
    /// denied.
    pub retry_after: Option<Duration>,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: FxHashMap<u64, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            requests: FxHashMap::default(),
        }
    }

    pub fn can_proceed(&mut self, user_id: u64) -> Decision {
        let now = Instant::now();
        let stamps = self.requests.entry(user_id).or_default();
        stamps.retain(|stamp| now.duration_since(*stamp) < self.window);

        if stamps.len() >= self.max_requests {
            let oldest = stamps[0];
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Decision {
                allowed: false,
                retry_after: Some(retry_after),
            };
        }

        stamps.push(now);
        Decision {
            allowed: true,
            retry_after: None,
        }
    }

    pub fn reset_user(&mut self, user_id: u64) {
        self.requests.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_denies_excess_with_positive_retry_after() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.can_proceed(1).allowed);
        }
        let decision = limiter.can_proceed(1);
        assert!(!decision.allowed);
        assert!(decision.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_users_are_independent() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.can_proceed(1).allowed);
        assert!(!limiter.can_proceed(1).allowed);
        assert!(limiter.can_proceed(2).allowed);
    }

    #[test]
    fn test_window_expiry_readmits() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(30));
        assert!(limiter.can_proceed(1).allowed);
        assert!(!limiter.can_proceed(1).allowed);

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.can_proceed(1).allowed);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.can_proceed(1).allowed);
        limiter.reset_user(1);
        assert!(limiter.can_proceed(1).allowed);
    }
}
