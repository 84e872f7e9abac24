//! Token bucket admission control.
//!
//! The limiter is advisory: [`RateLimiter::acquire`] never sleeps, it returns
//! how long the caller should wait. Tokens are only deducted when a request is
//! admitted, so a caller that was told to wait must call `acquire` again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use context_export_core::RateLimitConfig;
use tracing::debug;

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens per second
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Thread-safe token bucket shared by every request of one client
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    min_request_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst_size);
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                capacity,
                refill_rate: config.requests_per_second,
                last_refill: Instant::now(),
            }),
            min_request_interval: config.min_request_interval,
        }
    }

    /// Try to take `tokens` from the bucket.
    ///
    /// Returns `Duration::ZERO` when admitted. Otherwise nothing is deducted
    /// and the returned wait is the time until enough tokens accumulate,
    /// never less than the configured minimum request interval.
    pub fn acquire(&self, tokens: f64) -> Duration {
        let mut bucket = self.lock();
        bucket.refill(Instant::now());

        if bucket.tokens >= tokens {
            bucket.tokens -= tokens;
            return Duration::ZERO;
        }

        let deficit = tokens - bucket.tokens;
        let wait = Duration::try_from_secs_f64(deficit / bucket.refill_rate).unwrap_or(Duration::MAX);
        let wait = wait.max(self.min_request_interval);
        debug!(
            available = bucket.tokens,
            wait_ms = wait.as_millis() as u64,
            "Rate limit reached"
        );
        wait
    }

    /// Tokens currently available, after refilling
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.lock();
        bucket.refill(Instant::now());
        bucket.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.lock().capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenBucket> {
        // Bucket arithmetic cannot leave the state half-updated, so a
        // poisoned lock still holds a usable bucket.
        self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
