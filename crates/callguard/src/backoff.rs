//! Backoff delay calculation for retry attempts
//!
//! Computes the pause before the next retry attempt from the configured
//! strategy, the attempt number, and the classified severity of the last
//! failure. Pure except for the jitter draw, which goes through the
//! injectable [`JitterSource`] so tests can pin it.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classify::Severity;
use crate::retry::RetryConfig;

/// Strategy for growing the delay across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// `base * exponential_base^(attempt - 1)`
    ExponentialBackoff,
    /// `base * attempt`
    LinearBackoff,
    /// `base` on every attempt
    FixedDelay,
}

/// Source of the multiplicative jitter factor applied to computed delays.
///
/// Jitter desynchronizes concurrent retriers so they don't hammer a
/// recovering dependency in lockstep. Production uses [`ThreadRngJitter`];
/// tests use [`FixedJitter`] for deterministic delays.
pub trait JitterSource: Send + Sync {
    /// A factor in `[0.8, 1.2]` to scale the computed delay by.
    fn factor(&self) -> f64;
}

/// Thread-local RNG jitter, uniform in `[0.8, 1.2]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn factor(&self) -> f64 {
        rand::thread_rng().gen_range(0.8..=1.2)
    }
}

/// Fixed jitter factor for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn factor(&self) -> f64 {
        self.0
    }
}

/// Calculate the delay before the next retry attempt.
///
/// `attempt` is 1-based (the attempt that just failed). The severity scales
/// the configured base delay via [`Severity::delay_multiplier`], the strategy
/// grows it across attempts, jitter (when enabled) perturbs it, and the
/// result is capped at `config.max_delay`.
pub fn backoff_delay(attempt: u32, config: &RetryConfig, severity: Severity) -> Duration {
    backoff_delay_with(attempt, config, severity, &ThreadRngJitter)
}

/// Calculate the delay with an explicit jitter source.
pub fn backoff_delay_with(
    attempt: u32,
    config: &RetryConfig,
    severity: Severity,
    jitter: &dyn JitterSource,
) -> Duration {
    let adjusted_base = config.base_delay.as_secs_f64() * severity.delay_multiplier();

    let mut delay = match config.strategy {
        RetryStrategy::ExponentialBackoff => {
            adjusted_base * config.exponential_base.powi(attempt.saturating_sub(1) as i32)
        }
        RetryStrategy::LinearBackoff => adjusted_base * f64::from(attempt),
        RetryStrategy::FixedDelay => adjusted_base,
    };

    if config.jitter {
        delay *= jitter.factor();
    }

    let capped = delay.min(config.max_delay.as_secs_f64()).max(0.0);
    Duration::from_secs_f64(capped)
}
