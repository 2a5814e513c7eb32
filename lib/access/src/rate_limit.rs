//! Fixed-window rate limiting.
//!
//! A bucket counts requests for one key (client + route) within a window.
//! The window rolls over once `now >= window_start + window`; a request is
//! rejected when the incremented count would exceed the limit. Increment and
//! compare happen under one lock, so concurrent requests can never both take
//! the last slot.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::RateLimitStoreError;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub requests: u32,
    /// Window duration in seconds.
    pub window_seconds: u64,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    #[must_use]
    pub const fn new(requests: u32, window_seconds: u64) -> Self {
        Self {
            requests,
            window_seconds,
        }
    }

    /// Requests per minute.
    #[must_use]
    pub const fn per_minute(requests: u32) -> Self {
        Self::new(requests, 60)
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(50)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request is allowed.
    Allowed { remaining: u32, resets_in: Duration },
    /// Rate limit exceeded.
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    /// Returns true if the request is allowed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Returns the number of remaining requests (0 if limited).
    #[must_use]
    pub fn remaining(&self) -> u32 {
        match self {
            Self::Allowed { remaining, .. } => *remaining,
            Self::Limited { .. } => 0,
        }
    }

    /// Returns the `Retry-After` value in whole seconds, rounded up, at
    /// least 1. `None` when allowed.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Allowed { .. } => None,
            Self::Limited { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }
}

/// Counter for one key within the current window.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    window_start: Instant,
    count: u32,
    limit: u32,
    window: Duration,
}

impl RateLimitBucket {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit: config.requests,
            window: config.window(),
        }
    }

    fn resets_at(&self) -> Instant {
        self.window_start + self.window
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.resets_at()
    }

    fn hit(&mut self, now: Instant) -> RateLimitDecision {
        if self.is_expired(now) {
            self.window_start = now;
            self.count = 0;
        }

        let resets_in = self.resets_at().saturating_duration_since(now);
        if self.count >= self.limit {
            return RateLimitDecision::Limited {
                retry_after: resets_in,
            };
        }

        self.count += 1;
        RateLimitDecision::Allowed {
            remaining: self.limit - self.count,
            resets_in,
        }
    }

    /// Returns the number of requests counted in the current window.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Shared counter storage for rate limiting.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts a request against `key` and decides whether it may proceed.
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitStoreError>;
}

/// Single-process rate limiter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimiter {
    buckets: Arc<Mutex<HashMap<String, RateLimitBucket>>>,
}

impl InMemoryRateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a request against `key`.
    pub fn hit(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| RateLimitBucket::new(config, now))
            .hit(now)
    }

    /// Drops buckets whose window has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_expired(now));
        before - buckets.len()
    }

    /// Resets the rate limit for a key.
    pub fn reset(&self, key: &str) {
        self.buckets.lock().remove(key);
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Returns true if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        Ok(self.hit(key, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_under_limit() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(10, 60);

        for i in 0..10 {
            let decision = limiter.hit("client:/api/user/role", &config);
            assert!(decision.is_allowed());
            assert_eq!(decision.remaining(), 10 - i - 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fifty_first_request_is_limited() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(50);

        for _ in 0..50 {
            assert!(limiter.hit("c1:/api/user/role", &config).is_allowed());
        }

        tokio::time::advance(Duration::from_millis(20_500)).await;
        let decision = limiter.hit("c1:/api/user/role", &config);
        assert!(!decision.is_allowed());
        assert_eq!(decision.remaining(), 0);
        assert_eq!(decision.retry_after_secs(), Some(40));
    }

    #[tokio::test(start_paused = true)]
    async fn window_rolls_over() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(50);

        for _ in 0..51 {
            limiter.hit("c1:/r", &config);
        }
        assert!(!limiter.hit("c1:/r", &config).is_allowed());

        tokio::time::advance(Duration::from_secs(61)).await;
        let decision = limiter.hit("c1:/r", &config);
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining(), 49);
    }

    #[tokio::test(start_paused = true)]
    async fn rolls_over_exactly_at_window_end() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, 10);

        assert!(limiter.hit("k", &config).is_allowed());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.hit("k", &config).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_isolated() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(2, 60);

        limiter.hit("client-a:/r", &config);
        limiter.hit("client-a:/r", &config);

        assert!(!limiter.hit("client-a:/r", &config).is_allowed());
        assert!(limiter.hit("client-b:/r", &config).is_allowed());
        assert!(limiter.hit("client-a:/other", &config).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_key() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(1, 60);

        limiter.hit("k", &config);
        assert!(!limiter.hit("k", &config).is_allowed());

        limiter.reset("k");
        assert!(limiter.hit("k", &config).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_evicts_only_expired_buckets() {
        let limiter = InMemoryRateLimiter::new();
        limiter.hit("short", &RateLimitConfig::new(5, 10));
        limiter.hit("long", &RateLimitConfig::new(5, 120));
        assert_eq!(limiter.len(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_hits_never_exceed_limit() {
        let limiter = InMemoryRateLimiter::new();
        let config = RateLimitConfig::new(25, 60);

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter
                        .check_and_increment("shared", &config)
                        .await
                        .map(|d| d.is_allowed())
                })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.expect("task").expect("store") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 25);
    }

    #[test]
    fn retry_after_rounds_up() {
        let limited = RateLimitDecision::Limited {
            retry_after: Duration::from_millis(1_200),
        };
        assert_eq!(limited.retry_after_secs(), Some(2));

        let almost_done = RateLimitDecision::Limited {
            retry_after: Duration::ZERO,
        };
        assert_eq!(almost_done.retry_after_secs(), Some(1));

        let allowed = RateLimitDecision::Allowed {
            remaining: 3,
            resets_in: Duration::from_secs(5),
        };
        assert_eq!(allowed.retry_after_secs(), None);
    }

    #[test]
    fn config_deserializes() {
        let config: RateLimitConfig =
            serde_json::from_str(r#"{"requests": 50, "window_seconds": 60}"#).expect("parse");
        assert_eq!(config, RateLimitConfig::per_minute(50));
    }
}
