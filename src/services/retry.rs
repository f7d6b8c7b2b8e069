//! Retry with bounded, non-decreasing backoff.
//!
//! [`retry_with_policy`] wraps any async operation. The caller decides which errors are
//! transient through a predicate; everything else fails on the first attempt.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `retry × base_delay`.
    Linear,
    /// `base_delay × 2^(retry-1)` plus up to half of that again as jitter.
    Exponential,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `retries + 1`.
    pub retries: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Cap on a single delay.
    pub max_delay: Duration,
    /// Overall budget measured from the first attempt. No retry starts if its delay
    /// would overrun it.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
            backoff: Backoff::Linear,
            max_delay: Duration::from_secs(30),
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn linear(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
            backoff: Backoff::Linear,
            ..Default::default()
        }
    }

    pub fn exponential(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
            backoff: Backoff::Exponential,
            ..Default::default()
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::linear(0, Duration::ZERO)
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(retry),
            Backoff::Exponential => {
                let step = self
                    .base_delay
                    .saturating_mul(2u32.saturating_pow(retry - 1));
                // Jitter stays below the gap to the next step, so delays never shrink.
                let jitter_ms = (step.as_millis() / 2) as u64;
                let jitter = if jitter_ms > 0 {
                    Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
                } else {
                    Duration::ZERO
                };
                step.saturating_add(jitter)
            }
        };
        delay.min(self.max_delay)
    }

    /// Upper bound on the time spent waiting between attempts when every retry is used,
    /// jitter included.
    pub fn max_total_delay(&self) -> Duration {
        (1..=self.retries)
            .map(|retry| {
                let delay = match self.backoff {
                    Backoff::Linear => self.base_delay.saturating_mul(retry),
                    Backoff::Exponential => {
                        let step = self
                            .base_delay
                            .saturating_mul(2u32.saturating_pow(retry - 1));
                        step.saturating_add(step / 2)
                    }
                };
                delay.min(self.max_delay)
            })
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Runs `operation` until it succeeds, `should_retry` rejects the error, the retry budget
/// is spent, or the deadline would be overrun. The last error is returned unchanged.
pub async fn retry_with_policy<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let started = Instant::now();
    let mut retry = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    info!(operation = operation_name, attempts = retry + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if retry >= policy.retries || !should_retry(&err) {
            return Err(err);
        }

        retry += 1;
        let delay = policy.delay_for_retry(retry);
        if let Some(deadline) = policy.deadline {
            if started.elapsed() + delay > deadline {
                warn!(
                    operation = operation_name,
                    attempts = retry,
                    deadline_ms = deadline.as_millis() as u64,
                    error = %err,
                    "retry deadline reached"
                );
                return Err(err);
            }
        }

        warn!(
            operation = operation_name,
            retry,
            max_retries = policy.retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
