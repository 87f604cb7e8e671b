//! Resilience middleware for outbound calls to rate-limited dependencies
//!
//! Three independently usable primitives, designed to compose:
//! - **Retry**: severity-aware retry with exponential/linear/fixed backoff
//!   and jitter. How hard to retry depends on what failed, not just that
//!   something failed.
//! - **Circuit Breaker**: stops calling a persistently failing dependency
//!   and probes for recovery through a half-open state.
//! - **Rate Limiter**: continuous-refill token bucket that fails fast with
//!   a `retry_after` hint instead of queueing.
//!
//! Composition is explicit at the call site rather than hidden behind
//! decorators, outermost to innermost: rate limiter (don't spend budget on
//! calls we'd throttle), then circuit breaker (don't retry into a known-dead
//! dependency), then retry around the raw call:
//!
//! ```no_run
//! use callguard::{
//!     CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimitConfig, RetryConfig,
//!     retry_with_backoff,
//! };
//! # use std::time::Duration;
//! # #[derive(Debug, thiserror::Error)]
//! # #[error("api error")]
//! # struct ApiError;
//! # impl callguard::Fault for ApiError {
//! #     fn status(&self) -> Option<u16> { None }
//! # }
//! # async fn call_api() -> Result<String, ApiError> { Ok("ok".into()) }
//! # async fn demo() -> anyhow::Result<()> {
//! let limiter = RateLimiter::new("vision_api", RateLimitConfig::default())?;
//! let breaker = CircuitBreaker::new("vision_api", CircuitBreakerConfig::default())?;
//! let retry_config = RetryConfig::default();
//!
//! limiter.acquire()?;
//! let result = breaker
//!     .call(|| retry_with_backoff(call_api, &retry_config, "vision_analyze"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! All primitives are `Clone`-shareable across tasks, keep no global state,
//! and take an injectable clock so timeout behavior is testable without
//! real delays.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod clock;
pub mod config;
pub mod rate_limiter;
pub mod retry;

// Re-export the primary surface at the crate root
pub use backoff::{
    backoff_delay, backoff_delay_with, FixedJitter, JitterSource, RetryStrategy, ThreadRngJitter,
};
pub use circuit_breaker::{
    trip_policies, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerError, CircuitBreakerMetrics, CircuitState, TripPolicy,
};
pub use classify::{classifiers, classify_severity, Classifier, Fault, Severity};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigError, ConfigResult, ResilienceProfile, Tier};
pub use rate_limiter::{
    RateLimitExceededError, RateLimiter, RateLimitConfig, RateLimitConfigBuilder,
    RateLimiterMetrics,
};
pub use retry::{
    retry_with_backoff, ErrorContext, RetryConfig, RetryConfigBuilder, RetryExecutor, RetryOutcome,
};
