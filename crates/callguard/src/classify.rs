//! Error severity classification for retry decisions
//!
//! Maps a failed operation's error onto a four-level [`Severity`] scale that
//! the retry executor uses to decide whether (and how aggressively) to retry.
//! Classification is a pure function of the error's shape: no side effects,
//! deterministic for identical input.
//!
//! Instead of dispatching on concrete error types, the classifier works
//! against the [`Fault`] trait: any error the wrapped operation can produce
//! must expose an optional HTTP-style status code and a transport-failure
//! flag. This keeps the policy a finite, explicit table rather than a
//! type-hierarchy match.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How safe and useful it is to retry a given failure.
///
/// Ordered from most-retryable to never-retry, so `severity_a < severity_b`
/// means `a` is the safer one to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Temporary issues, safe to retry
    Low,
    /// Service issues, limited retries
    Medium,
    /// Critical issues, minimal retries
    High,
    /// System failures, no retries
    Critical,
}

impl Severity {
    /// Whether the retry executor is allowed to retry this failure at all.
    pub fn is_retryable(self) -> bool {
        self != Severity::Critical
    }

    /// Multiplier applied to the configured base delay before backoff.
    ///
    /// `Critical` never actually delays (it short-circuits the retry loop),
    /// but the multiplier is defined for completeness and testability.
    pub fn delay_multiplier(self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 1.0,
            Severity::High => 2.0,
            Severity::Critical => 5.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Shape an error must expose to be classifiable.
///
/// Implemented at the client boundary: whatever error type the downstream
/// client produces gets a `Fault` impl that surfaces its HTTP status code
/// (if any) and whether it was a network/connection/timeout failure.
pub trait Fault {
    /// HTTP-style status code carried by the error, if any.
    fn status(&self) -> Option<u16>;

    /// Whether this was a network, connection or timeout failure with no
    /// status code.
    fn is_transport(&self) -> bool {
        false
    }
}

/// Classify an error's severity for retry decisions.
///
/// Policy for status-coded errors:
/// - 429 (rate limited) → `Medium`
/// - 401/403 (auth) → `High`
/// - other 4xx → `Critical` (the request itself is malformed; retrying
///   wastes budget)
/// - 502/503/504 (transient upstream) → `Low`
/// - other 5xx → `Medium`
///
/// Transport failures without a status classify `Low`; anything
/// unrecognized defaults to `Medium`.
pub fn classify_severity<E: Fault>(error: &E) -> Severity {
    if let Some(status) = error.status() {
        return match status {
            429 => Severity::Medium,
            401 | 403 => Severity::High,
            400..=499 => Severity::Critical,
            502 | 503 | 504 => Severity::Low,
            500..=599 => Severity::Medium,
            _ => Severity::Medium,
        };
    }

    if error.is_transport() {
        Severity::Low
    } else {
        Severity::Medium
    }
}

/// Trait seam for pluggable severity classification
///
/// The retry executor consults a classifier rather than calling
/// [`classify_severity`] directly, so callers can install custom policies
/// for error types that are not status-coded.
pub trait Classifier<E>: Send + Sync {
    /// Determine the severity of the given error.
    fn severity(&self, error: &E) -> Severity;
}

/// Pre-defined classifiers for common scenarios
pub mod classifiers {
    use super::{classify_severity, Classifier, Fault, Severity};

    /// Status-code-driven classifier, the default for HTTP-style clients.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StatusClassifier;

    impl<E: Fault> Classifier<E> for StatusClassifier {
        fn severity(&self, error: &E) -> Severity {
            classify_severity(error)
        }
    }

    /// Classifier that assigns every error the same severity.
    ///
    /// Useful for error types with no status information, or for forcing
    /// fail-fast behavior (`FixedSeverity(Severity::Critical)`).
    #[derive(Debug, Clone, Copy)]
    pub struct FixedSeverity(pub Severity);

    impl<E> Classifier<E> for FixedSeverity {
        fn severity(&self, _error: &E) -> Severity {
            self.0
        }
    }
}
