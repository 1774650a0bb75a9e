//! Bounded retry with backoff.
//!
//! Shared by the backend API client (exponential) and browser navigation (linear).
//! Waiting goes through [`Clock`] so tests observe the delays without sleeping.

use crate::clock::Clock;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Backend API policy: 3 attempts, 2s then 4s
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
            backoff: Backoff::Exponential,
        }
    }

    /// Navigation policy: 2s, 4s, 6s, ...
    pub fn navigation(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(2000),
            backoff: Backoff::Linear,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay * attempt,
            Backoff::Exponential => self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::api()
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// No delay follows the final attempt; its error is returned.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => {
                error!(
                    "[Retry] {} failed after {} attempts: {}",
                    operation_name, attempt, err
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    error = %err,
                    "[Retry] {} attempt {}/{} failed, retrying in {}ms",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    delay.as_millis()
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
