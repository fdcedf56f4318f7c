//! Bounded retry loops for retriable failures.
//!
//! Only `Unavailable` errors are retried; everything else surfaces
//! immediately. Exhausting the budget converts the last failure into
//! `Aborted` so callers can distinguish "the server said no" from "we gave
//! up asking".

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Retry budget and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Failed attempts allowed after the first, before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry up to [`Self::max_delay`].
    pub init_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_retries: u32, init_delay: Duration) -> Self {
        Self {
            max_retries,
            init_delay,
            max_delay: Duration::from_secs(32),
        }
    }

    /// A configuration with no delay between attempts, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    pub(crate) fn exhausted(&self, last_error: &Error) -> Error {
        Error::aborted(format!(
            "All {} retry attempts failed. The last failure: {last_error}",
            self.max_retries
        ))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(500))
    }
}

/// Run `f` until it succeeds, fails terminally, or the budget runs out.
pub async fn call_with_retries<T, F, Fut>(config: &RetryConfig, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures = 0u32;
    let mut delay = config.init_delay;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retriable() => return Err(e),
            Err(e) => {
                failures += 1;
                if failures > config.max_retries {
                    return Err(config.exhausted(&e));
                }
                tracing::debug!(attempt = failures, error = %e, "retrying after failure");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}

/// Retry a deletion, treating a `NotFound` observed on a retry attempt as
/// success: the earlier attempt may have gone through before its response
/// was lost.
pub async fn delete_with_retries<F, Fut>(config: &RetryConfig, f: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut retried = false;
    let mut failures = 0u32;
    let mut delay = config.init_delay;
    loop {
        match f().await {
            Ok(()) => return Ok(()),
            Err(e) if retried && e.is_not_found() => return Ok(()),
            Err(e) => {
                retried = true;
                if !e.is_retriable() {
                    return Err(e);
                }
                failures += 1;
                if failures > config.max_retries {
                    return Err(config.exhausted(&e));
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
