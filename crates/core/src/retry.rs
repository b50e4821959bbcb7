// Copyright 2025 LLM Jury Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff with jitter around provider calls.
//!
//! Only errors for which [`ProviderError::is_transient`] holds are retried.
//! Each retry sleeps `min(backoff × (0.5 + U[0,1)), max_backoff)` (or the
//! plain backoff without jitter) and doubles the backoff up to the ceiling.

use crate::provider::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Retry parameters for provider and judge calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration, jitter: bool) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            jitter,
        }
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before the first retry.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Backoff ceiling.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Whether sleeps are randomized.
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Base backoff before each retry, without jitter.
    pub fn backoff_schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut backoff = self.initial_backoff.min(self.max_backoff);
        (0..self.max_retries).map(move |_| {
            let current = backoff;
            backoff = (backoff * 2).min(self.max_backoff);
            current
        })
    }

    /// Actual sleep for a base backoff, given a uniform sample in `[0, 1)`.
    pub fn delay_for(&self, backoff: Duration, sample: f64) -> Duration {
        let delay = if self.jitter {
            backoff.mul_f64(0.5 + sample)
        } else {
            backoff
        };
        delay.min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget
    /// is spent. On success returns the value and the number of attempts
    /// made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32), ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut schedule = self.backoff_schedule();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok((value, attempts)),
                Err(e) if e.is_transient() => match schedule.next() {
                    Some(backoff) => {
                        let delay = self.delay_for(backoff, rand::thread_rng().gen::<f64>());
                        warn!(
                            call = label,
                            error = %e,
                            attempt = attempts,
                            max_retries = self.max_retries,
                            backoff_secs = delay.as_secs_f64(),
                            "transient error, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(call = label, error = %e, attempts, "maximum retry attempts reached");
                        return Err(ProviderError::RetriesExhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}
