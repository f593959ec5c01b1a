use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::ApiError;

/// Fixed-window attempt counter kept in process memory.
///
/// Each `{prefix}:{identifier}` key counts attempts inside a window of
/// `window`. Once the counter exceeds `max_attempts` the caller gets
/// `ApiError::TooManyRequests` until the window rolls over.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, (u64, Instant)>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(
        &self,
        prefix: &str,
        identifier: &str,
        max_attempts: u64,
        window: Duration,
    ) -> Result<(), ApiError> {
        self.check_at(prefix, identifier, max_attempts, window, Instant::now())
    }

    fn check_at(
        &self,
        prefix: &str,
        identifier: &str,
        max_attempts: u64,
        window: Duration,
        now: Instant,
    ) -> Result<(), ApiError> {
        let key = format!("{prefix}:{identifier}");
        let mut entry = self.windows.entry(key).or_insert((0, now));
        let (count, started) = entry.value_mut();

        if now.duration_since(*started) >= window {
            *count = 0;
            *started = now;
        }
        *count += 1;

        if *count > max_attempts {
            return Err(ApiError::TooManyRequests);
        }
        Ok(())
    }

    /// Forget a key, e.g. after a successful login.
    pub fn reset(&self, prefix: &str, identifier: &str) {
        self.windows.remove(&format!("{prefix}:{identifier}"));
    }

    /// Drop windows older than `window`. Called from the outbox tick so the
    /// map does not grow without bound.
    pub fn prune(&self, window: Duration) {
        let now = Instant::now();
        self.windows
            .retain(|_, (_, started)| now.duration_since(*started) < window);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.windows.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn allows_up_to_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("login", "a@b.c", 3, WINDOW).is_ok());
        }
        assert!(matches!(
            limiter.check("login", "a@b.c", 3, WINDOW),
            Err(ApiError::TooManyRequests)
        ));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("login", "a", 1, WINDOW).is_ok());
        assert!(limiter.check("login", "a", 1, WINDOW).is_err());
        assert!(limiter.check("login", "b", 1, WINDOW).is_ok());
        assert!(limiter.check("other", "a", 1, WINDOW).is_ok());
    }

    #[test]
    fn window_rolls_over() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        assert!(limiter.check_at("login", "a", 1, WINDOW, start).is_ok());
        assert!(limiter.check_at("login", "a", 1, WINDOW, start).is_err());
        let later = start + WINDOW;
        assert!(limiter.check_at("login", "a", 1, WINDOW, later).is_ok());
    }

    #[test]
    fn reset_clears_counter() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("login", "a", 1, WINDOW).is_ok());
        limiter.reset("login", "a");
        assert!(limiter.check("login", "a", 1, WINDOW).is_ok());
    }

    #[test]
    fn prune_drops_stale_windows() {
        let limiter = RateLimiter::new();
        limiter.check("login", "a", 5, WINDOW).unwrap();
        assert_eq!(limiter.len(), 1);
        limiter.prune(Duration::ZERO);
        assert!(limiter.is_empty());
    }
}
