//! Token bucket rate limiter for outbound call pacing
//!
//! Continuous-refill token bucket: capacity is the steady-state allowance
//! plus a burst reserve, and tokens accrue fractionally at
//! `max_requests / time_window` per second. Acquisition is synchronous and
//! fail-fast; a rejected caller gets a `retry_after` hint instead of being
//! queued, so backpressure decisions stay with the caller.
//!
//! Clones share the same bucket, so one limiter can pace every worker
//! talking to a given dependency.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{duration_secs, ConfigError, ConfigResult};

/// Error returned when the bucket cannot cover a request
#[derive(Debug, Clone, Error)]
#[error("rate limit exceeded for '{name}', retry after {:.2}s", retry_after.as_secs_f64())]
pub struct RateLimitExceededError {
    /// Name of the limited dependency
    pub name: String,
    /// Estimated wait until enough tokens have refilled
    pub retry_after: Duration,
}

/// Configuration for token bucket behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests allowed per time window
    pub max_requests: u32,
    /// Window over which max_requests is measured
    #[serde(with = "duration_secs")]
    pub time_window: Duration,
    /// Extra burst capacity above the sustained rate
    pub burst_allowance: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration builder
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid {
                message: "max_requests must be greater than 0".to_string(),
            });
        }

        if self.time_window.is_zero() {
            return Err(ConfigError::Invalid {
                message: "time_window must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Total bucket capacity (sustained rate plus burst reserve)
    pub fn capacity(&self) -> u32 {
        self.max_requests + self.burst_allowance
    }

    /// Steady-state refill rate in tokens per second
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.max_requests) / self.time_window.as_secs_f64()
    }
}

/// Builder for RateLimitConfig
#[derive(Debug, Default)]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn new() -> Self {
        Self { config: RateLimitConfig::default() }
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    pub fn time_window(mut self, window: Duration) -> Self {
        self.config.time_window = window;
        self
    }

    pub fn burst_allowance(mut self, burst: u32) -> Self {
        self.config.burst_allowance = burst;
        self
    }

    pub fn build(self) -> ConfigResult<RateLimitConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Snapshot of limiter state for monitoring
#[derive(Debug, Clone)]
pub struct RateLimiterMetrics {
    pub available_tokens: f64,
    pub capacity: u32,
    pub total_acquired: u64,
    pub total_rejected: u64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    total_acquired: u64,
    total_rejected: u64,
}

/// Token bucket rate limiter for one named dependency
///
/// Starts with a full bucket, so the burst reserve is spendable
/// immediately. Clones share the bucket.
pub struct RateLimiter<C: Clock = SystemClock> {
    name: String,
    config: RateLimitConfig,
    bucket: Arc<Mutex<Bucket>>,
    clock: Arc<C>,
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl<C: Clock> Clone for RateLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            bucket: Arc::clone(&self.bucket),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl RateLimiter<SystemClock> {
    /// Create a rate limiter using the system clock
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter with an explicit clock
    pub fn with_clock(
        name: impl Into<String>,
        config: RateLimitConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let bucket = Bucket {
            tokens: f64::from(config.capacity()),
            last_refill: clock.now(),
            total_acquired: 0,
            total_rejected: 0,
        };

        Ok(Self {
            name: name.into(),
            config,
            bucket: Arc::new(Mutex::new(bucket)),
            clock: Arc::new(clock),
        })
    }

    /// Name of the limited dependency
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_bucket(&self) -> MutexGuard<'_, Bucket> {
        match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("rate limiter {} bucket lock poisoned", self.name);
                poisoned.into_inner()
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let refilled = bucket.tokens + elapsed * self.config.refill_rate();
            bucket.tokens = refilled.min(f64::from(self.config.capacity()));
            bucket.last_refill = now;
        }
    }

    /// Try to take one token from the bucket
    pub fn acquire(&self) -> Result<(), RateLimitExceededError> {
        self.acquire_n(1)
    }

    /// Try to take `tokens` tokens from the bucket.
    ///
    /// Fail-fast: on insufficient tokens nothing is deducted and the error
    /// carries the estimated wait until the request would be covered.
    pub fn acquire_n(&self, tokens: u32) -> Result<(), RateLimitExceededError> {
        let now = self.clock.now();
        let mut bucket = self.lock_bucket();
        self.refill(&mut bucket, now);

        let needed = f64::from(tokens);
        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            bucket.total_acquired += u64::from(tokens);
            Ok(())
        } else {
            bucket.total_rejected += 1;
            let deficit = needed - bucket.tokens;
            let retry_after = Duration::from_secs_f64(deficit / self.config.refill_rate());
            debug!(
                "rate limiter {} rejecting request for {} tokens, retry after {:?}",
                self.name, tokens, retry_after
            );
            Err(RateLimitExceededError { name: self.name.clone(), retry_after })
        }
    }

    /// Tokens currently available (after refill accounting)
    pub fn available_tokens(&self) -> f64 {
        let now = self.clock.now();
        let mut bucket = self.lock_bucket();
        self.refill(&mut bucket, now);
        bucket.tokens
    }

    /// Snapshot of limiter state for monitoring
    pub fn metrics(&self) -> RateLimiterMetrics {
        let now = self.clock.now();
        let mut bucket = self.lock_bucket();
        self.refill(&mut bucket, now);
        RateLimiterMetrics {
            available_tokens: bucket.tokens,
            capacity: self.config.capacity(),
            total_acquired: bucket.total_acquired,
            total_rejected: bucket.total_rejected,
        }
    }
}
