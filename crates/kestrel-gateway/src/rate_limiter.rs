//! Rate limiter with token bucket algorithm.
//!
//! This module provides thread-safe, lazily refilled token buckets keyed by
//! an admission key (a plugin identity, or `appId:scope` at the HTTP layer).
//! There is no background refill task: tokens are computed on every check
//! from the monotonic time elapsed since the previous one.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::limits::BucketLimits;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RateLimitResult {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Whole tokens left after this check.
    pub remaining: u32,
    /// The bucket capacity.
    pub limit: u32,
    /// Seconds until a token is available (only set when blocked).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Token bucket for a single key.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Current number of tokens, `0 <= tokens <= capacity`.
    tokens: f64,
    /// Last time tokens were refilled.
    last_refill: Instant,
}

impl TokenBucket {
    fn full(limits: &BucketLimits, now: Instant) -> Self {
        Self {
            tokens: f64::from(limits.capacity),
            last_refill: now,
        }
    }

    fn refill(&mut self, limits: &BucketLimits, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens =
            (self.tokens + elapsed * limits.refill_per_sec).min(f64::from(limits.capacity));
        self.last_refill = now;
    }

    /// Refill, then consume one token if available.
    fn check_and_consume(&mut self, limits: &BucketLimits, now: Instant) -> RateLimitResult {
        self.refill(limits, now);

        if self.tokens < 1.0 {
            let needed = 1.0 - self.tokens;
            let retry_after = if limits.refill_per_sec > 0.0 {
                (needed / limits.refill_per_sec).ceil() as u64
            } else {
                u64::MAX
            };
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                limit: limits.capacity,
                retry_after: Some(retry_after.max(1)),
            };
        }

        self.tokens -= 1.0;
        RateLimitResult {
            allowed: true,
            remaining: self.tokens.floor() as u32,
            limit: limits.capacity,
            retry_after: None,
        }
    }

    /// True once the bucket would be back at capacity.
    fn is_saturated(&self, limits: &BucketLimits, now: Instant) -> bool {
        let mut peek = self.clone();
        peek.refill(limits, now);
        peek.tokens >= f64::from(limits.capacity)
    }
}

/// Thread-safe token bucket rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    limits: BucketLimits,
    /// Partitioned buckets: admission key -> bucket
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    /// How often idle buckets are swept
    cleanup_interval: Duration,
    /// Last cleanup time
    last_cleanup: Arc<RwLock<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given bucket parameters.
    pub fn new(limits: BucketLimits) -> Self {
        Self {
            limits,
            buckets: Arc::new(RwLock::new(HashMap::new())),
            cleanup_interval: Duration::from_secs(300), // 5 minutes
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    /// Bucket parameters applied to every key.
    pub fn limits(&self) -> BucketLimits {
        self.limits
    }

    /// Check (and consume) one token for `key` using the current time.
    pub fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    /// Check (and consume) one token for `key` as of `now`.
    ///
    /// An unseen key starts with a full bucket.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        self.maybe_cleanup(now);

        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(&self.limits, now));

        bucket.check_and_consume(&self.limits, now)
    }

    /// Drop the bucket for `key`.
    pub fn forget(&self, key: &str) {
        self.buckets.write().remove(key);
    }

    /// Drop every bucket whose key starts with `prefix`.
    pub fn forget_prefix(&self, prefix: &str) {
        self.buckets.write().retain(|key, _| !key.starts_with(prefix));
    }

    /// Periodically drop buckets that have refilled completely.
    ///
    /// A saturated bucket is indistinguishable from a fresh one, so removing
    /// it only bounds memory.
    fn maybe_cleanup(&self, now: Instant) {
        {
            let last = self.last_cleanup.read();
            if now.saturating_duration_since(*last) < self.cleanup_interval {
                return;
            }
        }

        if let Some(mut last) = self.last_cleanup.try_write() {
            if now.saturating_duration_since(*last) >= self.cleanup_interval {
                *last = now;

                if let Some(mut buckets) = self.buckets.try_write() {
                    let limits = self.limits;
                    buckets.retain(|_, bucket| !bucket.is_saturated(&limits, now));
                }
            }
        }
    }

    /// Get statistics about the rate limiter.
    pub fn stats(&self) -> RateLimiterStats {
        let buckets = self.buckets.read();
        RateLimiterStats {
            active_keys: buckets.len(),
        }
    }
}

/// Statistics about the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Number of tracked admission keys.
    pub active_keys: usize,
}
