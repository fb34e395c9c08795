//! Fixed-backoff retry executor
//!
//! Retries an operation while its failure is classified as the retryable kind,
//! sleeping a fixed interval between attempts. The sleep races against a
//! cancellation token so a cancelled caller stops immediately instead of
//! running through the remaining attempts.

use crate::error::{ErrorKind, GatewayError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failures the executor knows how to classify
pub trait Classified {
    fn kind(&self) -> ErrorKind;

    /// Value returned when the caller cancels during a backoff
    fn cancelled() -> Self;
}

impl Classified for GatewayError {
    fn kind(&self) -> ErrorKind {
        GatewayError::kind(self)
    }

    fn cancelled() -> Self {
        GatewayError::Cancelled
    }
}

/// Per call-site retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, counting the first one
    pub max_attempts: u32,
    pub backoff: Duration,
    pub retry_on: ErrorKind,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retry_on: ErrorKind::Network,
        }
    }

    /// A single attempt, no retry
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.retry_on = kind;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Run `action` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up. The last failure is returned unchanged.
pub async fn run<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut action: F,
) -> Result<T, E>
where
    E: Classified + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(E::cancelled());
        }

        match action(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let kind = err.kind();
                if kind == ErrorKind::Cancelled
                    || kind != policy.retry_on
                    || attempt >= policy.max_attempts
                {
                    return Err(err);
                }

                tracing::debug!(
                    "Attempt {}/{} failed ({}), retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    err,
                    policy.backoff
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Retry cancelled during backoff after attempt {}", attempt);
                        return Err(E::cancelled());
                    }
                    _ = tokio::time::sleep(policy.backoff) => {}
                }
                attempt += 1;
            }
        }
    }
}
