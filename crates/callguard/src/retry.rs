//! Retry execution with severity-aware backoff
//!
//! Drives repeated invocation of a caller-supplied fallible operation,
//! consulting the severity classifier after each failure and the backoff
//! calculator before each new attempt. Attempts are strictly sequential;
//! the inter-attempt sleep is the only suspension point and holds no locks,
//! so concurrent operations in the same process are never blocked by a
//! retrying peer.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::backoff::{backoff_delay_with, JitterSource, RetryStrategy, ThreadRngJitter};
use crate::classify::{classifiers::StatusClassifier, Classifier, Fault, Severity};
use crate::config::{duration_secs, ConfigError, ConfigResult};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (must be >= 1)
    pub max_attempts: u32,
    /// Base delay before severity and strategy adjustments
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    /// Cap applied to every computed delay
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Growth factor for exponential backoff (must be > 1)
    pub exponential_base: f64,
    /// Whether to randomize delays to avoid synchronized retry storms
    pub jitter: bool,
    /// Strategy for growing the delay across attempts
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            strategy: RetryStrategy::ExponentialBackoff,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if self.base_delay.is_zero() {
            return Err(ConfigError::Invalid {
                message: "base_delay must be greater than zero".to_string(),
            });
        }

        if self.exponential_base <= 1.0 {
            return Err(ConfigError::Invalid {
                message: "exponential_base must be greater than 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn exponential_base(mut self, base: f64) -> Self {
        self.config.exponential_base = base;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = false;
        self
    }

    pub fn strategy(mut self, strategy: RetryStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-attempt context for logging and observability
///
/// Ephemeral: produced for each failed attempt within a single retry loop,
/// never persisted or shared.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Name of the operation being retried
    pub operation: String,
    /// Attempt number, 1-based
    pub attempt: u32,
    /// Configured attempt budget
    pub max_attempts: u32,
    /// Elapsed time since the first attempt started
    pub total_elapsed: Duration,
    /// Display form of the last error
    pub last_error: Option<String>,
    /// Classified severity of the last error
    pub severity: Severity,
}

/// Outcome of a retry execution including summary statistics.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Success value or the operation's own final error, unwrapped
    pub result: Result<T, E>,
    /// Number of attempts actually made
    pub attempts: u32,
    /// Total elapsed time from first attempt to completion
    pub total_elapsed: Duration,
    /// Context captured for the last failed attempt, if any
    pub last_context: Option<ErrorContext>,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// The main retry executor
///
/// Holds the configuration, the severity classifier and the jitter source.
/// Stateless across executions: every `execute` call runs an independent
/// retry loop and mutates no shared state.
pub struct RetryExecutor<C> {
    config: RetryConfig,
    classifier: C,
    jitter: Arc<dyn JitterSource>,
}

impl<C> RetryExecutor<C> {
    /// Create a new retry executor with the given configuration and
    /// classifier
    pub fn new(config: RetryConfig, classifier: C) -> Self {
        Self { config, classifier, jitter: Arc::new(ThreadRngJitter) }
    }

    /// Replace the jitter source (deterministic tests)
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Access the configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    ///
    /// Returns the success value, or the operation's own final error:
    /// failures are never wrapped, so callers can pattern-match on the
    /// underlying error type.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, operation: F) -> Result<T, E>
    where
        C: Classifier<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation_name, operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics.
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute_with_outcome<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        C: Classifier<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let mut last_context: Option<ErrorContext> = None;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(
                "attempting {} (attempt {}/{})",
                operation_name, attempt, self.config.max_attempts
            );

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "{} succeeded on attempt {} after {:?}",
                            operation_name,
                            attempt,
                            start.elapsed()
                        );
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        total_elapsed: start.elapsed(),
                        last_context,
                    };
                }
                Err(err) => {
                    let severity = self.classifier.severity(&err);
                    let context = ErrorContext {
                        operation: operation_name.to_string(),
                        attempt,
                        max_attempts: self.config.max_attempts,
                        total_elapsed: start.elapsed(),
                        last_error: Some(err.to_string()),
                        severity,
                    };

                    // Final attempt: surface the original error, never a wrapper.
                    if attempt >= self.config.max_attempts {
                        error!(
                            "{} failed after {} attempts in {:?}: {}",
                            operation_name,
                            attempt,
                            start.elapsed(),
                            err
                        );
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt,
                            total_elapsed: start.elapsed(),
                            last_context: Some(context),
                        };
                    }

                    // Critical failures are a fast-fail signal: no amount of
                    // waiting fixes a malformed request or a revoked key.
                    if !severity.is_retryable() {
                        error!("{} failed with critical error: {}", operation_name, err);
                        return RetryOutcome {
                            result: Err(err),
                            attempts: attempt,
                            total_elapsed: start.elapsed(),
                            last_context: Some(context),
                        };
                    }

                    let delay =
                        backoff_delay_with(attempt, &self.config, severity, self.jitter.as_ref());
                    warn!(
                        "{} attempt {} failed ({}): {}. retrying in {:?}",
                        operation_name, attempt, severity, err, delay
                    );
                    last_context = Some(context);

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Execute an operation with retry logic using the status-code classifier.
///
/// Convenience entry point for HTTP-style clients whose errors implement
/// [`Fault`]. For custom classification, construct a [`RetryExecutor`]
/// directly.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    E: Fault + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryExecutor::new(config.clone(), StatusClassifier)
        .execute(operation_name, operation)
        .await
}
