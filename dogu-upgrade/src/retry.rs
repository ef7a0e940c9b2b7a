//! Bounded retries for operations against the cluster.
//!
//! Two flavours exist: [`RetryPolicy`] retries up to a fixed number of attempts with a fixed
//! pause, asking a predicate whether an error is worth another attempt. [`DeadlineRetry`]
//! retries on every error until a time budget is spent. Both are plain values so that each
//! component gets its own copy at construction time.

use crate::common::{
    constants::{
        DEFAULT_IMAGE_PULL_PAUSE, DEFAULT_IMAGE_PULL_TIMEOUT, DEFAULT_MAX_RETRIES,
        DEFAULT_RETRY_PAUSE,
    },
    error::{
        Error::{RetriesExhausted, RetryTimeout},
        Result,
    },
    Error,
};
use std::{future::Future, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Fixed attempt ceiling with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_PAUSE)
    }
}

impl RetryPolicy {
    /// A ceiling of 0 is treated as a single attempt.
    pub fn new(max_attempts: u32, pause: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            pause,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Runs `operation` until it succeeds, fails with an error `retryable` rejects, or the
    /// attempt ceiling is hit. Errors rejected by `retryable` are returned unchanged; the
    /// ceiling yields [`Error::RetriesExhausted`] wrapping the last error.
    pub async fn run<T, F, Fut, P>(&self, operation: &str, retryable: P, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if !retryable(&error) => return Err(error),
                Err(error) if attempt >= self.max_attempts => {
                    return Err(RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(error),
                    })
                }
                Err(error) => {
                    debug!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        %error,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(self.pause).await;
                }
            }
        }
    }
}

/// Retries on any error until a time budget is spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadlineRetry {
    timeout: Duration,
    pause: Duration,
}

impl Default for DeadlineRetry {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_PULL_TIMEOUT, DEFAULT_IMAGE_PULL_PAUSE)
    }
}

impl DeadlineRetry {
    pub fn new(timeout: Duration, pause: Duration) -> Self {
        Self { timeout, pause }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `operation` until it succeeds. Once the budget is spent, the last error is
    /// returned wrapped into [`Error::RetryTimeout`]. The operation always runs at least once.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if Instant::now() + self.pause >= deadline => {
                    return Err(RetryTimeout {
                        timeout: self.timeout,
                        source: Box::new(error),
                    })
                }
                Err(error) => {
                    debug!(operation, attempt, %error, "Operation failed, retrying");
                    tokio::time::sleep(self.pause).await;
                }
            }
        }
    }
}

/// Retry predicate which accepts every error.
pub fn always(_: &Error) -> bool {
    true
}
