//! Circuit breaker for protecting persistently failing dependencies
//!
//! Wraps an operation with a three-state machine (closed/open/half-open)
//! that stops calling a dependency once consecutive failures cross a
//! threshold, and periodically probes for recovery with a bounded number of
//! trial calls. One breaker instance guards one named dependency for the
//! process lifetime; clones share state.
//!
//! State transitions are serialized by a single per-instance mutex. The
//! critical sections cover only state reads/writes — the wrapped operation
//! always executes outside the lock so unrelated calls through the same
//! breaker are never serialized by a slow dependency.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{duration_secs, ConfigError, ConfigResult};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Dependency considered down, calls rejected
    Open,
    /// Testing recovery with a bounded probe budget
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Error returned by a circuit-breaker-guarded call.
///
/// `Open` means the breaker refused to attempt the call at all. `Operation`
/// means the call was attempted; it is transparent, so the dependency's own
/// error message and source chain show through unchanged and callers can
/// still pattern-match on the inner type via [`Self::into_operation`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker is open (or its half-open probe budget is exhausted)
    #[error("circuit breaker '{name}' is open, rejecting calls")]
    Open {
        /// Name of the guarded dependency
        name: String,
    },

    /// The call was attempted and the operation itself failed
    #[error(transparent)]
    Operation { source: E },
}

impl<E> CircuitBreakerError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether this is a breaker rejection rather than an operation failure.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// Extract the wrapped operation error, if the call was attempted.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open { .. } => None,
            CircuitBreakerError::Operation { source } => Some(source),
        }
    }
}

/// Decides which error category the breaker reacts to.
///
/// The breaker is scoped to one category of failure: errors for which
/// `trips` returns false propagate to the caller without affecting breaker
/// state. This replaces exception-type matching with an explicit check.
pub trait TripPolicy<E>: Send + Sync {
    /// Whether this error counts against the failure threshold.
    fn trips(&self, error: &E) -> bool;
}

/// Pre-defined trip policies for common scenarios
pub mod trip_policies {
    use super::TripPolicy;
    use crate::classify::Fault;

    /// Count every error against the threshold.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AllFaults;

    impl<E> TripPolicy<E> for AllFaults {
        fn trips(&self, _error: &E) -> bool {
            true
        }
    }

    /// Count only status-coded or transport failures — the analog of
    /// monitoring a single downstream client's error type.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StatusFaults;

    impl<E: Fault> TripPolicy<E> for StatusFaults {
        fn trips(&self, error: &E) -> bool {
            error.status().is_some() || error.is_transport()
        }
    }

    /// Predicate-based trip policy for custom categorization.
    #[derive(Debug, Clone)]
    pub struct PredicateTrip<F> {
        predicate: F,
    }

    impl<F> PredicateTrip<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> TripPolicy<E> for PredicateTrip<F>
    where
        F: Fn(&E) -> bool + Send + Sync,
    {
        fn trips(&self, error: &E) -> bool {
            (self.predicate)(error)
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive tripping failures that open the circuit
    pub failure_threshold: u32,
    /// Time an open circuit waits before allowing a recovery probe
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,
    /// Maximum probe calls allowed during one half-open episode
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.half_open_max_calls == 0 {
            return Err(ConfigError::Invalid {
                message: "half_open_max_calls must be greater than 0".to_string(),
            });
        }

        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "recovery_timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Snapshot of breaker state for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_calls: u32,
    pub total_calls: u64,
    pub last_failure_time: Option<Instant>,
}

/// Mutable breaker state, guarded by one mutex per instance.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    half_open_calls: u32,
    total_calls: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            half_open_calls: 0,
            total_calls: 0,
        }
    }
}

/// Circuit breaker guarding one named dependency
///
/// Create one instance per downstream service and hold it for the process
/// lifetime; clones share the underlying state. The trip policy defaults to
/// [`trip_policies::AllFaults`] and the clock to [`SystemClock`]; both are
/// injectable for scoping and testing.
pub struct CircuitBreaker<P = trip_policies::AllFaults, C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    policy: P,
    inner: Arc<Mutex<BreakerInner>>,
    clock: Arc<C>,
}

impl<P: fmt::Debug, C: Clock> fmt::Debug for CircuitBreaker<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish()
    }
}

impl<P: Clone, C: Clock> Clone for CircuitBreaker<P, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            policy: self.policy.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<trip_policies::AllFaults, SystemClock> {
    /// Create a breaker that counts every error, using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_parts(name, config, trip_policies::AllFaults, SystemClock)
    }
}

impl<P, C: Clock> CircuitBreaker<P, C> {
    /// Create a breaker with an explicit trip policy and clock
    pub fn with_parts(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        policy: P,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;

        Ok(Self {
            name: name.into(),
            config,
            policy,
            inner: Arc::new(Mutex::new(BreakerInner::new())),
            clock: Arc::new(clock),
        })
    }

    /// Name of the guarded dependency
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_inner(&self) -> MutexGuard<'_, BreakerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("circuit breaker {} state lock poisoned", self.name);
                poisoned.into_inner()
            }
        }
    }

    /// Admission check: may this call proceed right now?
    ///
    /// Performs the OPEN -> HALF_OPEN transition when the recovery timeout
    /// has elapsed and charges half-open probe budget, all atomically with
    /// respect to other calls on the same instance.
    fn try_admit(&self) -> Result<(), ()> {
        let mut inner = self.lock_inner();
        inner.total_calls += 1;

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let now = self.clock.now();
                let recovered = inner
                    .last_failure_time
                    .is_some_and(|t| now.duration_since(t) >= self.config.recovery_timeout);

                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_calls = 1; // this call is the first probe
                    info!("circuit breaker {} transitioning to HALF_OPEN", self.name);
                    Ok(())
                } else {
                    debug!("circuit breaker {} rejecting call while OPEN", self.name);
                    Err(())
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    debug!(
                        "circuit breaker {} half-open probe budget exhausted",
                        self.name
                    );
                    Err(())
                } else {
                    inner.half_open_calls += 1;
                    Ok(())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock_inner();

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            info!("circuit breaker {} recovered, transitioning to CLOSED", self.name);
        }
        inner.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.lock_inner();
        inner.failure_count += 1;
        inner.last_failure_time = Some(self.clock.now());

        if inner.failure_count >= self.config.failure_threshold
            && inner.state != CircuitState::Open
        {
            inner.state = CircuitState::Open;
            warn!(
                "circuit breaker {} opened after {} failures",
                self.name, inner.failure_count
            );
        }
    }

    /// Execute an async operation with circuit breaker protection
    ///
    /// Rejected calls never invoke the operation. Attempted calls return the
    /// operation's result, recording success or (policy-matching) failure
    /// against the state machine. The operation runs outside the state lock.
    #[instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        P: TripPolicy<E>,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if self.try_admit().is_err() {
            return Err(CircuitBreakerError::Open { name: self.name.clone() });
        }

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                if self.policy.trips(&error) {
                    self.on_failure();
                } else {
                    debug!(
                        "circuit breaker {} ignoring non-matching error: {}",
                        self.name, error
                    );
                }
                Err(CircuitBreakerError::Operation { source: error })
            }
        }
    }

    /// Execute a synchronous operation with circuit breaker protection
    ///
    /// Same semantics as [`call`](Self::call) for non-async contexts.
    pub fn call_sync<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        P: TripPolicy<E>,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        if self.try_admit().is_err() {
            return Err(CircuitBreakerError::Open { name: self.name.clone() });
        }

        match operation() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                if self.policy.trips(&error) {
                    self.on_failure();
                }
                Err(CircuitBreakerError::Operation { source: error })
            }
        }
    }

    /// Current circuit state
    pub fn state(&self) -> CircuitState {
        self.lock_inner().state
    }

    /// Whether the breaker is in normal operation
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Snapshot of breaker state for monitoring
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock_inner();
        CircuitBreakerMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            half_open_calls: inner.half_open_calls,
            total_calls: inner.total_calls,
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Reset the breaker to closed state with all counters cleared
    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.half_open_calls = 0;
        inner.last_failure_time = None;
        info!("circuit breaker {} manually reset to CLOSED", self.name);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::clock::MockClock;

    fn config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_secs(60))
            .half_open_max_calls(2)
            .build()
            .expect("valid test config")
    }

    fn breaker_with_clock(
        threshold: u32,
        clock: MockClock,
    ) -> CircuitBreaker<trip_policies::AllFaults, MockClock> {
        CircuitBreaker::with_parts("vision_api", config(threshold), trip_policies::AllFaults, clock)
            .expect("valid breaker")
    }

    fn io_error() -> std::io::Error {
        std::io::Error::other("dependency failure")
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_config_default() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_max_calls, 3);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::builder().failure_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().half_open_max_calls(0).build().is_err());
        assert!(CircuitBreakerConfig::builder()
            .recovery_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_new_breaker_starts_closed() {
        let cb = CircuitBreaker::new("vision_api", CircuitBreakerConfig::default())
            .expect("valid breaker");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_closed());
        assert_eq!(cb.name(), "vision_api");
    }

    /// After exactly failure_threshold consecutive failures the circuit is
    /// OPEN and the next call is rejected without invoking the operation.
    #[tokio::test]
    async fn test_circuit_opens_at_threshold() {
        let cb = breaker_with_clock(3, MockClock::new());
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result = cb
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(io_error())
                })
                .await;
            assert!(!result.expect_err("should fail").is_open());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let rejected = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(())
            })
            .await;

        assert!(rejected.expect_err("should be rejected").is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "rejected call must not invoke operation");
    }

    #[tokio::test]
    async fn test_below_threshold_stays_closed() {
        let cb = breaker_with_clock(3, MockClock::new());

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    /// Success resets the consecutive-failure count.
    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker_with_clock(3, MockClock::new());

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        }
        let _ = cb.call(|| async { Ok::<_, std::io::Error>(()) }).await;
        assert_eq!(cb.metrics().failure_count, 0);

        // Two more failures should still not open the circuit.
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    /// After recovery_timeout elapses, the next call transitions to
    /// HALF_OPEN and is attempted; success closes the circuit fully.
    #[tokio::test]
    async fn test_recovery_via_half_open() {
        let clock = MockClock::new();
        let cb = breaker_with_clock(2, clock.clone());

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(61));

        let result = cb.call(|| async { Ok::<_, std::io::Error>("recovered") }).await;
        assert_eq!(result.expect("probe should succeed"), "recovered");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failure_count, 0);
    }

    #[tokio::test]
    async fn test_open_rejects_before_timeout() {
        let clock = MockClock::new();
        let cb = breaker_with_clock(1, clock.clone());

        let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(30));

        let result = cb.call(|| async { Ok::<_, std::io::Error>(()) }).await;
        assert!(result.expect_err("should reject").is_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    /// A failure during the half-open probe reopens the circuit.
    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let clock = MockClock::new();
        let cb = breaker_with_clock(2, clock.clone());

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        }
        clock.advance(Duration::from_secs(61));

        let result = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        assert!(!result.expect_err("probe fails").is_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    /// While HALF_OPEN, no more than half_open_max_calls operations are
    /// invoked; further calls are rejected without reaching the dependency.
    #[tokio::test]
    async fn test_half_open_probe_budget() {
        let clock = MockClock::new();
        // Only timeouts trip; other errors pass through without moving the
        // state machine, which keeps the breaker parked in HALF_OPEN while
        // we count probe admissions.
        let cb = CircuitBreaker::with_parts(
            "probing",
            CircuitBreakerConfig::builder()
                .failure_threshold(2)
                .recovery_timeout(Duration::from_secs(60))
                .half_open_max_calls(2)
                .build()
                .expect("valid config"),
            trip_policies::PredicateTrip::new(|e: &std::io::Error| {
                e.kind() == std::io::ErrorKind::TimedOut
            }),
            clock.clone(),
        )
        .expect("valid breaker");

        let timeout = || std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(timeout()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(61));

        let calls = AtomicU32::new(0);
        for _ in 0..2 {
            let result = cb
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(io_error())
                })
                .await;
            assert!(!result.expect_err("probe fails").is_open());
        }
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Budget spent: the third call is rejected without being invoked.
        let rejected = cb
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(())
            })
            .await;
        assert!(rejected.expect_err("budget exhausted").is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Errors not matching the trip policy propagate without affecting
    /// breaker state.
    #[tokio::test]
    async fn test_non_matching_errors_ignored() {
        let cb = CircuitBreaker::with_parts(
            "scoped",
            config(2),
            trip_policies::PredicateTrip::new(|e: &std::io::Error| {
                e.kind() == std::io::ErrorKind::TimedOut
            }),
            MockClock::new(),
        )
        .expect("valid breaker");

        for _ in 0..5 {
            let result = cb.call(|| async { Err::<(), _>(io_error()) }).await;
            assert!(!result.expect_err("fails").is_open());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failure_count, 0);

        let timeout = || std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(timeout()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    /// The async call path is usable from a blocking context too.
    #[test]
    fn test_async_call_from_blocking_context() {
        let cb = CircuitBreaker::new("blocking_host", config(2)).expect("valid breaker");

        let result = tokio_test::block_on(cb.call(|| async { Ok::<_, std::io::Error>(9) }));
        assert_eq!(result.expect("should succeed"), 9);

        tokio_test::block_on(async {
            let _ = cb.call(|| async { Err::<(), _>(io_error()) }).await;
        });
        assert_eq!(cb.metrics().failure_count, 1);
    }

    #[test]
    fn test_call_sync() {
        let cb = CircuitBreaker::new("sync_dep", config(2)).expect("valid breaker");

        let ok = cb.call_sync(|| Ok::<_, std::io::Error>(42));
        assert_eq!(ok.expect("should succeed"), 42);

        for _ in 0..2 {
            let _ = cb.call_sync(|| Err::<(), _>(io_error()));
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let rejected = cb.call_sync(|| Ok::<_, std::io::Error>(0));
        assert!(rejected.expect_err("rejected").is_open());
    }

    #[test]
    fn test_reset() {
        let cb = CircuitBreaker::new("resettable", config(1)).expect("valid breaker");

        let _ = cb.call_sync(|| Err::<(), _>(io_error()));
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().failure_count, 0);
        assert!(cb.metrics().last_failure_time.is_none());
    }

    #[test]
    fn test_metrics_snapshot() {
        let cb = CircuitBreaker::new("observed", config(5)).expect("valid breaker");

        let _ = cb.call_sync(|| Ok::<_, std::io::Error>(()));
        let _ = cb.call_sync(|| Err::<(), _>(io_error()));

        let metrics = cb.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.failure_count, 1);
        assert_eq!(metrics.total_calls, 2);
        assert!(metrics.last_failure_time.is_some());
    }

    #[test]
    fn test_clone_shares_state() {
        let cb1 = CircuitBreaker::new("shared", config(1)).expect("valid breaker");
        let cb2 = cb1.clone();

        let _ = cb1.call_sync(|| Err::<(), _>(io_error()));
        assert_eq!(cb2.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_concurrent_calls() {
        let cb =
            Arc::new(CircuitBreaker::new("concurrent", config(100)).expect("valid breaker"));
        let mut handles = Vec::new();

        for _ in 0..10 {
            let cb = Arc::clone(&cb);
            handles.push(tokio::spawn(async move {
                cb.call(|| async { Ok::<_, std::io::Error>(()) }).await
            }));
        }

        for handle in handles {
            assert!(handle.await.expect("task completes").is_ok());
        }
        assert_eq!(cb.metrics().total_calls, 10);
    }

    #[test]
    fn test_error_display_and_source() {
        let err: CircuitBreakerError<std::io::Error> =
            CircuitBreakerError::Open { name: "vision_api".to_string() };
        assert!(err.to_string().contains("vision_api"));
        assert!(err.is_open());
        assert!(err.into_operation().is_none());

        let err: CircuitBreakerError<std::io::Error> =
            CircuitBreakerError::Operation { source: io_error() };
        assert!(!err.is_open());
        // Transparent: the dependency's own message shows through unchanged.
        assert_eq!(err.to_string(), io_error().to_string());
        assert!(err.into_operation().is_some());
    }
}
