//! Per-provider token bucket that blocks instead of rejecting.
//!
//! Tokens refill continuously at `limit / window` per second up to `limit`.
//! `acquire` sleeps until a token is available; the internal lock is not
//! held while sleeping, so other providers are never blocked.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;
use warden_core::config::RateLimitConfig;

/// Longest uninterrupted sleep while a cancellable caller waits for a token.
const WAIT_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn capacity(&self, provider: &str) -> f64 {
        f64::from(self.config.limit_for(provider).max(1))
    }

    /// Tokens per second.
    fn refill_rate(&self, provider: &str) -> f64 {
        self.capacity(provider) / self.config.window.as_secs_f64().max(f64::EPSILON)
    }

    /// Refill and try to take one token. `Err(wait)` is the time until one
    /// token will be available.
    fn take(&self, provider: &str) -> Result<(), Duration> {
        let capacity = self.capacity(provider);
        let rate = self.refill_rate(provider);
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let bucket = buckets.entry(provider.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        let wait = (1.0 - bucket.tokens) / rate;
        Err(Duration::try_from_secs_f64(wait).unwrap_or(self.config.window))
    }

    /// Block until a token for `provider` is available; returns the time spent waiting.
    pub fn acquire(&self, provider: &str) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.take(provider) {
                Ok(()) => return waited,
                Err(wait) => {
                    debug!(provider, ?wait, "rate limited, waiting for token");
                    std::thread::sleep(wait);
                    waited += wait;
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up without taking a token
    /// once `abandoned` returns true. Waits are sliced so that is noticed promptly.
    pub fn acquire_unless(&self, provider: &str, abandoned: impl Fn() -> bool) -> Option<Duration> {
        let mut waited = Duration::ZERO;
        loop {
            if abandoned() {
                debug!(provider, ?waited, "caller gone, token not taken");
                return None;
            }
            match self.take(provider) {
                Ok(()) => return Some(waited),
                Err(wait) => {
                    let slice = wait.min(WAIT_SLICE);
                    std::thread::sleep(slice);
                    waited += slice;
                }
            }
        }
    }

    /// Non-blocking variant: take a token if one is available right now.
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.take(provider).is_ok()
    }

    pub fn reset(&self, provider: &str) {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(provider);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
