//! Conflict-aware retry for remote calls.
//!
//! The remote serializes mutations per instance and answers concurrent
//! callers with a lock error. Those are retried with exponential backoff
//! until the operation deadline; every other failure returns immediately.

use crate::error::{Error, Result};
use crate::types::{DEFAULT_TIMEOUT, RetryDecision};
use std::thread;
use std::time::{Duration, Instant};

/// Text the remote puts in the response body when the instance is locked.
pub const LOCK_CONFLICT_MARKER: &str = "event locked";

/// Errors a remote client surfaces to the reconciliation core.
pub trait RemoteFailure: std::error::Error + Send + Sync + 'static {
    /// Raw body of an unexpected-status response, if the error carries one.
    fn response_body(&self) -> Option<&str>;

    /// Whether the remote reported the object as missing.
    fn is_not_found(&self) -> bool;

    /// Classify the failure. Only a status error whose body carries the
    /// lock marker is worth retrying.
    fn retry_decision(&self) -> RetryDecision {
        match self.response_body() {
            Some(body) if body.contains(LOCK_CONFLICT_MARKER) => RetryDecision::Retryable,
            _ => RetryDecision::Permanent,
        }
    }
}

/// Backoff schedule bounded by a deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Budget measured from the first attempt
    pub deadline: Duration,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_TIMEOUT,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Default backoff with a custom deadline.
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Run one remote call, retrying while the instance is locked.
///
/// Wrap exactly one call per invocation; multi-step sequences need a retry
/// scope per step. Permanent failures come back as [`Error::Remote`] after a
/// single attempt; a lock that outlasts the deadline becomes
/// [`Error::Timeout`] carrying the last lock error.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    E: RemoteFailure,
    F: FnMut() -> std::result::Result<T, E>,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match call() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.retry_decision() == RetryDecision::Permanent {
            return Err(Error::Remote {
                operation: operation.to_string(),
                source: Box::new(err),
            });
        }

        let elapsed = started.elapsed();
        let remaining = policy.deadline.saturating_sub(elapsed);
        if remaining.is_zero() {
            return Err(Error::Timeout {
                operation: operation.to_string(),
                elapsed,
                attempts,
                source: Box::new(err),
            });
        }

        let delay = policy.delay_for_attempt(attempts - 1).min(remaining);
        log::warn!("{operation}: instance locked (attempt {attempts}), retrying in {delay:?}");
        log::debug!("{operation}: {err}");
        thread::sleep(delay);
    }
}
