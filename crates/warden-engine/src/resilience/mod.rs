pub mod circuit_breaker;
pub mod layer;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use layer::{ResilienceError, ResilienceLayer};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryError, RetryPolicy};
