//! Rate Limiter (Token Bucket)
//!
//! Caps the rate of mutating RPC calls so a misbehaving client cannot
//! flood the queue store.

use std::sync::Mutex;
use std::time::Instant;

/// Token-bucket rate limiter
///
/// The bucket refills continuously at `refill_rate` tokens per second up to
/// `max_tokens`. Each allowed request consumes one token.
pub struct RateLimiter {
    inner: Mutex<Bucket>,
    max_tokens: f64,
    refill_rate: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// # Arguments
    /// * `max_tokens` - Maximum burst size
    /// * `refill_rate` - Tokens added per second
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        Self {
            inner: Mutex::new(Bucket {
                tokens: max_tokens as f64,
                last_refill: Instant::now(),
            }),
            max_tokens: max_tokens as f64,
            refill_rate: refill_rate as f64,
        }
    }

    /// Check if a request is allowed (consumes 1 token)
    pub fn check(&self) -> bool {
        let mut bucket = self.inner.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Remaining tokens (for monitoring)
    pub fn remaining(&self) -> f64 {
        self.inner.lock().unwrap().tokens
    }
}
