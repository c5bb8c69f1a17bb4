//! Failure-handling combinators
//!
//! Wrappers that run an operation and decide what happens when it fails:
//!
//! - [`suppress`] drops the failure silently
//! - [`suppress_if`] drops only failures matching a predicate
//! - [`log_errors`] drops the failure after logging it
//! - [`RetryPolicy::run`] re-runs the operation a fixed number of times
//! - [`RetryPolicy::run_if`] re-runs it only for retryable failures
//!
//! Each has an async twin. They only distinguish success from failure;
//! retries place no bound on the error type, and the logging wrappers
//! need it to implement `Display`. Combinators compose by nesting:
//!
//! ```rust
//! use kuba_databus::resilience::{log_errors, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(2, Duration::ZERO);
//! let mut calls = 0;
//! let result = log_errors("flaky", || {
//!     policy.run(|| {
//!         calls += 1;
//!         if calls < 2 { Err("busy") } else { Ok(calls) }
//!     })
//! });
//! assert_eq!(result, Some(2));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Run `op`, discarding any failure
pub fn suppress<T, E, F>(op: F) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
{
    op().ok()
}

/// Await `fut`, discarding any failure
pub async fn suppress_async<T, E, Fut>(fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
{
    fut.await.ok()
}

/// Run `op`; failures matching `predicate` become `default`, others propagate
pub fn suppress_if<T, E, P, F>(predicate: P, default: T, op: F) -> Result<T, E>
where
    P: FnOnce(&E) -> bool,
    F: FnOnce() -> Result<T, E>,
{
    match op() {
        Ok(value) => Ok(value),
        Err(e) if predicate(&e) => Ok(default),
        Err(e) => Err(e),
    }
}

/// Run `op`, logging and discarding any failure
pub fn log_errors<T, E, F>(context: &str, op: F) -> Option<T>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    match op() {
        Ok(value) => Some(value),
        Err(e) => {
            error!(context, error = %e, "Operation failed");
            None
        },
    }
}

/// Await `fut`, logging and discarding any failure
pub async fn log_errors_async<T, E, Fut>(context: &str, fut: Fut) -> Option<T>
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(context, error = %e, "Operation failed");
            None
        },
    }
}

/// Fixed-interval retry policy
///
/// An operation runs at most `retries + 1` times, sleeping `wait` between
/// attempts. The last failure is returned unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    /// Default: 3
    pub retries: u32,

    /// Delay between attempts
    /// Default: 300ms
    #[serde(with = "duration_ms")]
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            wait: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(retries: u32, wait: Duration) -> Self {
        Self { retries, wait }
    }

    /// Total attempts the policy allows
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Check if we should retry after the given attempt (0-indexed)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.retries
    }

    /// Run a blocking operation under this policy
    ///
    /// Sleeps the calling thread between attempts; use
    /// [`run_async`](Self::run_async) on the runtime.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.run_blocking(|_| true, op, false)
    }

    /// Run a blocking operation, retrying only failures `retryable` accepts
    ///
    /// Retries are logged at debug level, which suits tight loops on a hot
    /// path such as retrying a full socket buffer.
    pub fn run_if<T, E, P, F>(&self, retryable: P, op: F) -> Result<T, E>
    where
        P: FnMut(&E) -> bool,
        F: FnMut() -> Result<T, E>,
    {
        self.run_blocking(retryable, op, true)
    }

    fn run_blocking<T, E, P, F>(&self, mut retryable: P, mut op: F, quiet: bool) -> Result<T, E>
    where
        P: FnMut(&E) -> bool,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(attempt) && retryable(&e) => {
                    attempt += 1;
                    if quiet {
                        debug!(attempt, max_attempts = self.max_attempts(), "Retrying");
                    } else {
                        warn!(
                            attempt,
                            max_attempts = self.max_attempts(),
                            "Operation failed, retrying in {:?}",
                            self.wait
                        );
                    }
                    if !self.wait.is_zero() {
                        std::thread::sleep(self.wait);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Run an async operation under this policy
    pub async fn run_async<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(_) if self.should_retry(attempt) => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts(),
                        "Operation failed, retrying in {:?}",
                        self.wait
                    );
                    tokio::time::sleep(self.wait).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serialize a `Duration` as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
