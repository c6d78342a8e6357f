//! # Retry
//!
//! Module providing a `RetryPolicy` struct to bound retries of calls to external services.
use std::future::Future;
use std::time;

use tracing::warn;

/// Errors returned by external calls classify themselves, so a policy only retries failures
/// that have a chance of succeeding on a second attempt.
pub trait RetryableError: std::error::Error {
    fn is_retryable(&self) -> bool;
}

#[derive(Clone, Debug)]
/// A retry policy to determine how often and how long to wait before retrying a call.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<time::Duration>,
    /// Total number of attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Initialize a `RetryPolicyBuilder`.
    pub fn build(backoff_coefficient: u32, initial_interval: time::Duration) -> RetryPolicyBuilder {
        RetryPolicyBuilder::new(backoff_coefficient, initial_interval)
    }

    /// A policy that attempts every call exactly once.
    pub fn no_retries() -> Self {
        RetryPolicyBuilder::default().max_attempts(1).provide()
    }

    /// Determine interval for retrying at a given attempt number.
    pub fn retry_interval(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self
            .initial_interval
            .saturating_mul(self.backoff_coefficient.saturating_pow(attempt.saturating_sub(1)));

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or runs out of attempts.
    /// The last error is returned as-is.
    pub async fn retry<T, E, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, E>
    where
        E: RetryableError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let interval = self.retry_interval(attempt);
                    warn!(
                        operation,
                        attempt,
                        "retryable error, retrying in {:?}: {}",
                        interval,
                        err
                    );
                    metrics::counter!("facematch_external_call_retries_total", "operation" => operation)
                        .increment(1);

                    tokio::time::sleep(interval).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().provide()
    }
}

/// Builder pattern struct to provide a `RetryPolicy`.
pub struct RetryPolicyBuilder {
    /// Coefficient to multiply initial_interval with for every past attempt.
    pub backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    pub initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    pub maximum_interval: Option<time::Duration>,
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_millis(200),
            maximum_interval: None,
            max_attempts: 3,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn new(backoff_coefficient: u32, initial_interval: time::Duration) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            ..RetryPolicyBuilder::default()
        }
    }

    pub fn maximum_interval(mut self, interval: time::Duration) -> RetryPolicyBuilder {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> RetryPolicyBuilder {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Provide a `RetryPolicy` according to build parameters provided thus far.
    pub fn provide(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_coefficient: self.backoff_coefficient,
            initial_interval: self.initial_interval,
            maximum_interval: self.maximum_interval,
            max_attempts: self.max_attempts,
        }
    }
}
