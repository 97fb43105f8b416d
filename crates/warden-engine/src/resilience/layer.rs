use tracing::{debug, warn};
use warden_core::config::GovernanceConfig;
use warden_core::contracts::CancelToken;

use super::circuit_breaker::{BreakerError, CircuitBreakerRegistry, CircuitState};
use super::rate_limiter::RateLimiter;
use super::retry::{RetryError, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error("CIRCUIT_OPEN: provider {provider} is failing, retry later")]
    CircuitOpen { provider: String },
    #[error("{0}")]
    Retry(RetryError<E>),
    /// The caller stopped waiting before the call could complete.
    #[error("CANCELLED: call to {provider} abandoned by caller")]
    Cancelled { provider: String },
}

impl<E> From<BreakerError<RetryError<E>>> for ResilienceError<E> {
    fn from(err: BreakerError<RetryError<E>>) -> Self {
        match err {
            BreakerError::Open { provider } => ResilienceError::CircuitOpen { provider },
            BreakerError::Inner(inner) => ResilienceError::Retry(inner),
        }
    }
}

/// Guards every outbound provider call:
/// `rate_limiter.acquire(provider) -> breaker.call(provider, || retry(f))`.
///
/// A full retry sequence counts as one breaker outcome. Once the caller's
/// [`CancelToken`] fires, no token is taken, no attempt starts and no breaker
/// outcome is recorded.
#[derive(Debug)]
pub struct ResilienceLayer {
    rate_limiter: RateLimiter,
    breakers: CircuitBreakerRegistry,
    retry: RetryPolicy,
}

impl ResilienceLayer {
    pub fn new(rate_limiter: RateLimiter, breakers: CircuitBreakerRegistry, retry: RetryPolicy) -> Self {
        Self {
            rate_limiter,
            breakers,
            retry,
        }
    }

    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(
            RateLimiter::new(config.rate_limits.clone()),
            CircuitBreakerRegistry::new(config.breaker.clone()),
            RetryPolicy::from(&config.retry),
        )
    }

    pub fn call<T, E, F, R>(&self, provider: &str, retryable: R, f: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        self.call_cancellable(provider, &CancelToken::new(), retryable, f)
    }

    pub fn call_cancellable<T, E, F, R>(
        &self,
        provider: &str,
        cancel: &CancelToken,
        retryable: R,
        f: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        let cancelled = || ResilienceError::Cancelled {
            provider: provider.to_string(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        if self.is_open(provider) {
            return Err(ResilienceError::CircuitOpen {
                provider: provider.to_string(),
            });
        }
        let abandoned = || cancel.is_cancelled();
        let Some(waited) = self.rate_limiter.acquire_unless(provider, abandoned) else {
            return Err(cancelled());
        };
        if !waited.is_zero() {
            warn!(provider, ?waited, "provider call delayed by rate limiter");
        }
        match self
            .breakers
            .call_unless(provider, abandoned, || self.retry.run_unless(abandoned, retryable, f))
        {
            Ok(value) => Ok(value),
            Err(BreakerError::Inner(RetryError::Cancelled { attempts, .. })) => {
                debug!(provider, attempts, "provider call cancelled");
                Err(cancelled())
            }
            Err(_) if cancel.is_cancelled() => {
                debug!(provider, "provider call finished after caller left");
                Err(cancelled())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn is_open(&self, provider: &str) -> bool {
        self.breakers.get(provider).state() == CircuitState::Open
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for ResilienceLayer {
    fn default() -> Self {
        Self::from_config(&GovernanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;
    use warden_core::config::{BreakerConfig, RateLimitConfig};

    fn layer(threshold: u32, max_retries: u32) -> ResilienceLayer {
        ResilienceLayer::new(
            RateLimiter::new(RateLimitConfig::default()),
            CircuitBreakerRegistry::new(BreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(60),
            }),
            RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_secs(5)),
        )
    }

    #[test]
    fn retries_inside_one_breaker_call() {
        let l = layer(3, 2);
        let calls = Cell::new(0);
        let r: Result<u32, ResilienceError<&str>> = l.call("fake", |_| true, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err("flaky")
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(r.unwrap(), 3);
        assert_eq!(l.breakers().get("fake").consecutive_failures(), 0);
    }

    #[test]
    fn cancelled_before_start_never_invokes() {
        let l = layer(1, 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        let calls = Cell::new(0);
        let r: Result<(), ResilienceError<&str>> = l.call_cancellable("fake", &cancel, |_| true, || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(matches!(r, Err(ResilienceError::Cancelled { .. })));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn failure_after_cancel_leaves_breaker_untouched() {
        let l = layer(1, 3);
        let cancel = CancelToken::new();
        let calls = Cell::new(0);
        let r: Result<(), ResilienceError<&str>> = l.call_cancellable("fake", &cancel, |_| true, || {
            calls.set(calls.get() + 1);
            // the caller times out while this attempt is still running
            cancel.cancel();
            Err("late failure")
        });
        assert!(matches!(r, Err(ResilienceError::Cancelled { .. })));
        assert_eq!(calls.get(), 1);
        assert_eq!(l.breakers().get("fake").consecutive_failures(), 0);
        assert!(!l.is_open("fake"));
    }

    #[test]
    fn exhausted_sequences_open_the_breaker() {
        let l = layer(2, 1);
        let calls = Cell::new(0);
        for _ in 0..2 {
            let r: Result<(), ResilienceError<&str>> = l.call("fake", |_| true, || {
                calls.set(calls.get() + 1);
                Err("down")
            });
            assert!(matches!(r, Err(ResilienceError::Retry(RetryError::Exhausted { .. }))));
        }
        assert_eq!(calls.get(), 4);
        assert!(l.is_open("fake"));
        let r: Result<(), ResilienceError<&str>> = l.call("fake", |_| true, || {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(matches!(r, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.get(), 4);
    }
}
