//! Retry with exponential backoff under a shared wall-clock budget.

use std::time::{Duration, Instant};

use tracing::debug;
use warden_core::config::RetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every configured attempt failed.
    #[error("MAX_RETRIES: gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// The budget ran out, or the next backoff would overrun it.
    #[error("TIMEOUT: retry budget of {budget:?} exhausted after {attempts} attempts")]
    Timeout {
        attempts: u32,
        budget: Duration,
        last: Option<E>,
    },
    /// The error was classified as not worth retrying.
    #[error("{0}")]
    Permanent(E),
    /// The caller stopped waiting; no further attempt was made.
    #[error("CANCELLED: caller gone after {attempts} attempts")]
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Timeout { last, .. } => last.as_ref(),
            RetryError::Permanent(e) => Some(e),
            RetryError::Cancelled { last, .. } => last.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            timeout,
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry - 1).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Retry every error.
    pub fn run<T, E, F>(&self, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.run_if(|_| true, f)
    }

    /// Retry only errors for which `retryable` returns true.
    ///
    /// Never sleeps past the budget: if the remaining budget is smaller than
    /// the next planned delay, returns `Timeout` immediately.
    pub fn run_if<T, E, F, R>(&self, retryable: R, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        self.run_unless(|| false, retryable, f)
    }

    /// [`run_if`](Self::run_if) that stops before the next attempt once
    /// `abandoned` returns true.
    pub fn run_unless<T, E, F, R, A>(&self, abandoned: A, retryable: R, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        A: Fn() -> bool,
    {
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last: Option<E> = None;
        loop {
            if abandoned() {
                debug!(attempts, "caller gone, no further attempts");
                return Err(RetryError::Cancelled { attempts, last });
            }
            if start.elapsed() >= self.timeout {
                return Err(RetryError::Timeout {
                    attempts,
                    budget: self.timeout,
                    last,
                });
            }
            attempts += 1;
            let err = match f() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !retryable(&err) {
                return Err(RetryError::Permanent(err));
            }
            if attempts > self.max_retries {
                return Err(RetryError::Exhausted {
                    attempts,
                    last: err,
                });
            }
            let delay = self.delay_for_retry(attempts);
            let remaining = self.timeout.saturating_sub(start.elapsed());
            if remaining < delay {
                debug!(attempts, ?delay, ?remaining, "retry budget too small for next backoff");
                return Err(RetryError::Timeout {
                    attempts,
                    budget: self.timeout,
                    last: Some(err),
                });
            }
            debug!(attempts, ?delay, "retrying after backoff");
            last = Some(err);
            std::thread::sleep(delay);
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay, config.timeout)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
