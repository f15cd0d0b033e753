//! Retry policy for upstream requests
//!
//! A [`RetryPolicy`] owns everything the transport needs to decide whether a
//! failed request gets another go: the attempt budget, a [`Backoff`] schedule
//! capped at `max_delay`, and the predicate marking HTTP statuses transient.
//!
//! # Example
//!
//! ```no_run
//! use weeb_dl::{Error, RetryPolicy};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::default();
//! let _body = policy
//!     .run(|| async { Ok::<_, Error>(b"<html></html>".to_vec()) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, NetworkError};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether a second attempt could succeed
pub trait IsRetryable {
    /// True when the failure is transient
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for NetworkError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_transient(),
            // Shape drift, local I/O, encoding, config and cancellation never
            // improve on a second attempt
            Error::StructuralMismatch { .. }
            | Error::IncompleteArtifact { .. }
            | Error::Io { .. }
            | Error::Encode(_)
            | Error::Config { .. }
            | Error::InvalidUrl(_)
            | Error::Cancelled => false,
        }
    }
}

/// Delay schedule between attempts
///
/// Grows by `backoff_multiplier` per step and never exceeds `max_delay`,
/// whatever the multiplier. Jitter stretches a step by up to 100%.
#[derive(Clone, Debug)]
pub struct Backoff {
    upcoming: Duration,
    ceiling: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Schedule starting at `initial_delay`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            upcoming: config.initial_delay.min(config.max_delay),
            ceiling: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let current = self.upcoming;
        self.upcoming = scaled(current, self.multiplier)
            .unwrap_or(self.ceiling)
            .min(self.ceiling);

        if self.jitter {
            let stretch: f64 = rand::thread_rng().gen_range(0.0..=1.0);
            scaled(current, 1.0 + stretch).unwrap_or(current)
        } else {
            current
        }
    }
}

/// `delay * factor`, or `None` when the product is not a representable duration
fn scaled(delay: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).ok()
}

/// Retry settings plus the status predicate consulted by the transport
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Attempts, delays, backoff and jitter
    pub config: RetryConfig,
    /// Whether a response status is transient
    pub retryable_status: fn(u16) -> bool,
}

impl RetryPolicy {
    /// Policy retrying server errors (5xx) only
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retryable_status: is_server_error,
        }
    }

    /// Replace the status predicate
    pub fn with_status_predicate(mut self, predicate: fn(u16) -> bool) -> Self {
        self.retryable_status = predicate;
        self
    }

    /// Whether the policy retries `status`
    pub fn retries_status(&self, status: u16) -> bool {
        (self.retryable_status)(status)
    }

    /// Run `operation` until it succeeds, fails for good, or the budget runs out
    ///
    /// `max_attempts` counts retries after the first call. The last error is
    /// returned unchanged.
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + Display,
    {
        let mut backoff = Backoff::new(&self.config);
        let mut retries = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        tracing::info!(attempts = retries + 1, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::debug!(error = %error, "Request failed permanently");
                return Err(error);
            }
            if retries >= self.config.max_attempts {
                tracing::error!(
                    error = %error,
                    attempts = retries + 1,
                    "Request failed, retries exhausted"
                );
                return Err(error);
            }

            retries += 1;
            let delay = backoff.next_delay();
            tracing::warn!(
                error = %error,
                retry = retries,
                max_retries = self.config.max_attempts,
                delay_ms = delay.as_millis(),
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Default status predicate: 5xx is transient, 4xx is the caller's problem
pub fn is_server_error(status: u16) -> bool {
    (500..600).contains(&status)
}
