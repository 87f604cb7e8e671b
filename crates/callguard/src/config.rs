//! Configuration validation and deployment tier presets
//!
//! Every config type in this crate validates at construction and is
//! immutable afterwards. This module holds the shared [`ConfigError`], the
//! serde representation for durations (fractional seconds, matching how the
//! settings files express timeouts), and the per-tier presets that bundle
//! retry, circuit breaker and rate limiter settings for a deployment
//! environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::RetryStrategy;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limiter::RateLimitConfig;
use crate::retry::RetryConfig;

/// Error produced by config validation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its valid range
    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    /// An environment name did not match any known tier
    #[error("unknown deployment tier '{name}'")]
    UnknownTier { name: String },
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Serde representation for durations as fractional seconds.
///
/// Settings files express timeouts as plain numbers of seconds
/// (`"recovery_timeout": 120.0`), so duration fields use this module via
/// `#[serde(with = "duration_secs")]`.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {secs}"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Deployment tier selecting a resilience preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Development,
    Staging,
    Production,
}

impl Tier {
    /// Resolve an environment name to a tier, falling back to
    /// `Development` for anything unrecognized.
    ///
    /// The fallback is deliberate: a typo'd environment variable should
    /// degrade to the most conservative rate limits, not crash startup.
    pub fn from_env_name(name: &str) -> Tier {
        name.parse().unwrap_or(Tier::Development)
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Tier::Development),
            "staging" => Ok(Tier::Staging),
            "production" | "prod" => Ok(Tier::Production),
            other => Err(ConfigError::UnknownTier { name: other.to_string() }),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Development => write!(f, "development"),
            Tier::Staging => write!(f, "staging"),
            Tier::Production => write!(f, "production"),
        }
    }
}

/// Bundle of retry, circuit breaker and rate limiter settings for one
/// guarded dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceProfile {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimitConfig,
}

impl ResilienceProfile {
    /// Validate every component config
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.rate_limiter.validate()?;
        Ok(())
    }

    /// Preset for the given deployment tier
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Production => Self {
                retry: RetryConfig {
                    max_attempts: 5,
                    base_delay: Duration::from_secs(1),
                    max_delay: Duration::from_secs(60),
                    exponential_base: 2.0,
                    jitter: true,
                    strategy: RetryStrategy::ExponentialBackoff,
                },
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: 10,
                    recovery_timeout: Duration::from_secs(120),
                    half_open_max_calls: 5,
                },
                rate_limiter: RateLimitConfig {
                    max_requests: 100,
                    time_window: Duration::from_secs(60),
                    burst_allowance: 20,
                },
            },
            Tier::Staging => Self {
                retry: RetryConfig {
                    max_attempts: 4,
                    base_delay: Duration::from_secs(1),
                    max_delay: Duration::from_secs(45),
                    exponential_base: 2.0,
                    jitter: true,
                    strategy: RetryStrategy::ExponentialBackoff,
                },
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: 7,
                    recovery_timeout: Duration::from_secs(90),
                    half_open_max_calls: 4,
                },
                rate_limiter: RateLimitConfig {
                    max_requests: 50,
                    time_window: Duration::from_secs(60),
                    burst_allowance: 10,
                },
            },
            Tier::Development => Self {
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay: Duration::from_secs(1),
                    max_delay: Duration::from_secs(30),
                    exponential_base: 2.0,
                    jitter: true,
                    strategy: RetryStrategy::ExponentialBackoff,
                },
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: 5,
                    recovery_timeout: Duration::from_secs(60),
                    half_open_max_calls: 3,
                },
                rate_limiter: RateLimitConfig {
                    max_requests: 15,
                    time_window: Duration::from_secs(60),
                    burst_allowance: 5,
                },
            },
        }
    }

    /// Preset for an environment name, falling back to development
    pub fn for_env_name(name: &str) -> Self {
        Self::for_tier(Tier::from_env_name(name))
    }
}
