//! Retry with exponential backoff around remote model calls
//!
//! The schedule is a pure function of the attempt number so it can be tested
//! without a clock; [`RetryPolicy::run`] is the only place that sleeps.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use lexicon_core::{LexiconError, LlmConfig, Result};

/// Outcome of a single attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    Success(T),
    /// Transient failure, worth another attempt
    Retryable {
        reason: String,
        /// Server-provided hint, e.g. from a `Retry-After` header
        retry_after: Option<Duration>,
    },
    /// Permanent failure, retrying cannot help
    Fatal(String),
}

impl<T> Attempt<T> {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

/// Exponential backoff capped at a maximum delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    initial: Duration,
    max: Duration,
}

impl BackoffSchedule {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// Doubles with every attempt up to the cap. A `retry_after` hint longer
    /// than the computed delay wins, but is itself capped.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let computed = self.initial.saturating_mul(1u32 << exponent).min(self.max);
        match retry_after {
            Some(hint) => computed.max(hint.min(self.max)),
            None => computed,
        }
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(8000))
    }
}

/// Bounded retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    schedule: BackoffSchedule,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, schedule: BackoffSchedule) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.max_attempts,
            BackoffSchedule::new(
                Duration::from_millis(config.initial_backoff_ms),
                Duration::from_millis(config.max_backoff_ms),
            ),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    /// Run `f` until it succeeds, fails fatally, or the attempts run out
    ///
    /// `f` receives the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut attempt = 1;

        loop {
            match f(attempt).await {
                Attempt::Success(value) => {
                    if attempt > 1 {
                        info!(operation, attempts = attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Attempt::Fatal(reason) => {
                    warn!(operation, attempt, error = %reason, "Operation failed permanently");
                    return Err(LexiconError::RemoteModel(reason));
                }
                Attempt::Retryable {
                    reason,
                    retry_after,
                } => {
                    if attempt >= self.max_attempts {
                        warn!(
                            operation,
                            attempts = attempt,
                            error = %reason,
                            "Operation failed after max attempts"
                        );
                        return Err(LexiconError::RemoteModelExhausted {
                            attempts: attempt,
                            last_error: reason,
                        });
                    }

                    let delay = self.schedule.delay(attempt, retry_after);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Operation failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffSchedule::default())
    }
}
