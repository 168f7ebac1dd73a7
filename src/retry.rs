//! Bounded exponential backoff for transient I/O failures.
//!
//! The storage gateway and queue adapter both absorb transient errors at the
//! lowest layer: an operation is retried with doubling delays until it
//! succeeds, fails fatally, or exhausts the attempt budget. Exhaustion
//! escalates to the caller as a typed error; it is never swallowed.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry budget and pacing.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry; doubles on each subsequent one
    pub base_delay: Duration,

    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_attempts: 4,
        }
    }
}

/// Per-attempt error classification, decided by the operation.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Worth retrying (network hiccup, throttle, 5xx)
    Transient(E),

    /// Retrying cannot help (not found, access denied)
    Fatal(E),
}

/// Terminal outcome of a retried operation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with a non-retryable error
    Fatal(E),

    /// Every attempt failed transiently
    Exhausted { attempts: u32, last: E },
}

/// Run `op` under `policy`, sleeping between transient failures.
pub async fn with_backoff<T, E, F, Fut>(
    policy: BackoffPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Attempt::Fatal(e)) => return Err(RetryError::Fatal(e)),
            Err(Attempt::Transient(e)) => {
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                warn!(
                    op = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
