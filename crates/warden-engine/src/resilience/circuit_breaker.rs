//! Per-provider circuit breaker.
//!
//! CLOSED --(N consecutive failures)--> OPEN --(cooldown)--> HALF_OPEN
//! HALF_OPEN admits exactly one probe: success closes, failure reopens.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_core::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without invoking the wrapped function.
    Open,
    /// Cooldown elapsed; one probe call may go through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("CIRCUIT_OPEN: provider {provider} is failing, retry later")]
    Open { provider: String },
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move OPEN to HALF_OPEN once the cooldown has elapsed.
    fn check_cooldown(&self, s: &mut BreakerState) {
        if s.state != CircuitState::Open {
            return;
        }
        let cooled = s
            .last_failure
            .map_or(true, |at| at.elapsed() >= self.config.cooldown);
        if cooled {
            info!(provider = %self.provider, "circuit breaker half-open after cooldown");
            s.state = CircuitState::HalfOpen;
            s.probe_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut s = self.lock();
        self.check_cooldown(&mut s);
        s.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Admit or reject one call. Taking the HALF_OPEN probe is part of admission.
    fn admit(&self) -> bool {
        let mut s = self.lock();
        self.check_cooldown(&mut s);
        match s.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen if s.probe_in_flight => false,
            CircuitState::HalfOpen => {
                s.probe_in_flight = true;
                true
            }
        }
    }

    pub fn record_success(&self) {
        let mut s = self.lock();
        if s.state != CircuitState::Closed {
            info!(provider = %self.provider, from = %s.state, "circuit breaker closing");
        }
        s.state = CircuitState::Closed;
        s.consecutive_failures = 0;
        s.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut s = self.lock();
        s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        s.last_failure = Some(Instant::now());
        match s.state {
            CircuitState::HalfOpen => {
                warn!(provider = %self.provider, "circuit breaker re-opening after failed probe");
                s.state = CircuitState::Open;
                s.probe_in_flight = false;
            }
            CircuitState::Closed if s.consecutive_failures >= self.config.failure_threshold => {
                warn!(
                    provider = %self.provider,
                    failures = s.consecutive_failures,
                    "circuit breaker opening"
                );
                s.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    /// Give back a HALF_OPEN probe without recording an outcome.
    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    /// Run `f` under the breaker. While OPEN, `f` is never invoked.
    /// A panic in `f` counts as a failure and is then resumed.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_unless(|| false, f)
    }

    /// [`call`](Self::call) for callers that may stop waiting. If `abandoned`
    /// holds once `f` returns, the outcome is not recorded and any probe slot
    /// taken for the call is released.
    pub fn call_unless<T, E, F, A>(&self, abandoned: A, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        A: Fn() -> bool,
    {
        if !self.admit() {
            debug!(provider = %self.provider, "call rejected, circuit open");
            return Err(BreakerError::Open {
                provider: self.provider.clone(),
            });
        }
        let outcome = catch_unwind(AssertUnwindSafe(f));
        if abandoned() {
            debug!(provider = %self.provider, "caller gone, outcome not recorded");
            self.release_probe();
            return match outcome {
                Ok(result) => result.map_err(BreakerError::Inner),
                Err(panic) => resume_unwind(panic),
            };
        }
        match outcome {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
            Err(panic) => {
                warn!(provider = %self.provider, "call panicked, counted as failure");
                self.record_failure();
                resume_unwind(panic)
            }
        }
    }

    pub fn reset(&self) {
        let mut s = self.lock();
        s.state = CircuitState::Closed;
        s.consecutive_failures = 0;
        s.last_failure = None;
        s.probe_in_flight = false;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.provider)
            .field("state", &self.state())
            .finish()
    }
}

/// Lazily created breakers, one per provider, sharing one configuration.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, provider: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            breakers
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(provider, self.config.clone()))),
        )
    }

    pub fn call<T, E, F>(&self, provider: &str, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.get(provider).call(f)
    }

    pub fn call_unless<T, E, F, A>(&self, provider: &str, abandoned: A, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        A: Fn() -> bool,
    {
        self.get(provider).call_unless(abandoned, f)
    }

    pub fn states(&self) -> BTreeMap<String, CircuitState> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        breakers
            .into_iter()
            .map(|b| (b.provider().to_string(), b.state()))
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn breaker(cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "fake",
            BreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_millis(cooldown_ms),
            },
        )
    }

    fn fail(b: &CircuitBreaker) {
        let r: Result<(), BreakerError<&str>> = b.call(|| Err("boom"));
        assert!(matches!(r, Err(BreakerError::Inner("boom"))));
    }

    #[test]
    fn opens_after_threshold() {
        let b = breaker(60_000);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.consecutive_failures(), 3);
    }

    #[test]
    fn open_circuit_never_invokes() {
        let b = breaker(60_000);
        for _ in 0..3 {
            fail(&b);
        }
        let invoked = Cell::new(false);
        let r: Result<(), BreakerError<&str>> = b.call(|| {
            invoked.set(true);
            Ok(())
        });
        assert!(matches!(r, Err(BreakerError::Open { .. })));
        assert!(!invoked.get());
    }

    #[test]
    fn success_resets_counter() {
        let b = breaker(60_000);
        fail(&b);
        fail(&b);
        let r: Result<u8, BreakerError<&str>> = b.call(|| Ok(1));
        assert_eq!(r.unwrap(), 1);
        assert_eq!(b.consecutive_failures(), 0);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_success_closes() {
        let b = breaker(20);
        for _ in 0..3 {
            fail(&b);
        }
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(b.state(), CircuitState::HalfOpen);
        let r: Result<&str, BreakerError<&str>> = b.call(|| Ok("ok"));
        assert_eq!(r.unwrap(), "ok");
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.consecutive_failures(), 0);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let b = breaker(20);
        for _ in 0..3 {
            fail(&b);
        }
        std::thread::sleep(Duration::from_millis(40));
        fail(&b);
        let r: Result<(), BreakerError<&str>> = b.call(|| Ok(()));
        assert!(matches!(r, Err(BreakerError::Open { .. })));
    }

    #[test]
    fn half_open_admits_single_probe() {
        let b = breaker(20);
        for _ in 0..3 {
            fail(&b);
        }
        std::thread::sleep(Duration::from_millis(40));
        let r: Result<(), BreakerError<&str>> = b.call(|| {
            // a concurrent caller during the probe is rejected
            let inner: Result<(), BreakerError<&str>> = b.call(|| Ok(()));
            assert!(matches!(inner, Err(BreakerError::Open { .. })));
            Ok(())
        });
        assert!(r.is_ok());
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn panic_in_half_open_call_reopens_and_recovers() {
        let b = CircuitBreaker::new(
            "fake",
            BreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_millis(20),
            },
        );
        fail(&b);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(b.state(), CircuitState::HalfOpen);

        let caught = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), BreakerError<&str>> = b.call(|| -> Result<(), &str> { panic!("provider crashed") });
        }));
        assert!(caught.is_err());
        assert_eq!(b.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(40));
        let r: Result<u8, BreakerError<&str>> = b.call(|| Ok(7));
        assert_eq!(r.unwrap(), 7);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn panic_while_closed_counts_as_failure() {
        let b = breaker(60_000);
        let caught = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), BreakerError<&str>> = b.call(|| -> Result<(), &str> { panic!("provider crashed") });
        }));
        assert!(caught.is_err());
        assert_eq!(b.consecutive_failures(), 1);
    }

    #[test]
    fn abandoned_outcome_is_not_recorded() {
        let b = breaker(20);
        let r: Result<(), BreakerError<&str>> = b.call_unless(|| true, || Err("late"));
        assert!(matches!(r, Err(BreakerError::Inner("late"))));
        assert_eq!(b.consecutive_failures(), 0);

        for _ in 0..3 {
            fail(&b);
        }
        std::thread::sleep(Duration::from_millis(40));
        let r: Result<(), BreakerError<&str>> = b.call_unless(|| true, || Err("late"));
        assert!(r.is_err());
        // the half-open slot was handed back, not spent
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(b.consecutive_failures(), 3);
        let r: Result<(), BreakerError<&str>> = b.call(|| Ok(()));
        assert!(r.is_ok());
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn registry_isolates_providers() {
        let reg = CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        });
        let r: Result<(), BreakerError<&str>> = reg.call("openai", || Err("down"));
        assert!(r.is_err());
        assert_eq!(reg.get("openai").state(), CircuitState::Open);
        assert_eq!(reg.get("anthropic").state(), CircuitState::Closed);
        assert!(Arc::ptr_eq(&reg.get("openai"), &reg.get("openai")));
        assert_eq!(reg.states().len(), 2);
    }
}
