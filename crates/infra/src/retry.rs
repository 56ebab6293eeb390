//! Bounded retry around transactional workflow attempts.
//!
//! Both workflows run as "read snapshot, decide, commit with version checks".
//! A commit-time version conflict means a concurrent writer won; the only
//! correct recovery is to re-run the whole attempt from fresh reads. This
//! module is that loop: bounded attempts, growing backoff, and a strict
//! transient-vs-fatal split so business rejections are never re-run.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear backoff: base * attempt
    Linear,
    /// Exponential backoff: base * 2^attempt
    Exponential,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            strategy: BackoffStrategy::Linear,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-running after `attempt` failed attempts (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * attempt,
            BackoffStrategy::Exponential => self.base_delay * 2u32.saturating_pow(attempt - 1),
        }
    }
}

/// Failure classification for the retry loop.
pub trait Retryable {
    /// Transient failures (write conflicts) are retried; everything else is
    /// fatal on first occurrence.
    fn is_transient(&self) -> bool;
}

/// Run `body` until it succeeds, fails fatally, or exhausts the policy.
///
/// The body is re-invoked from scratch on every attempt; it must not carry
/// state across attempts.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut body: F) -> Result<T, E>
where
    E: Retryable + core::fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match body().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, ?delay, error = ?err, "transient conflict, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
