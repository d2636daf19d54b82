//! Retry policies for transient chain errors.

use core::future::Future;
use core::time::Duration;

use ::retry::delay::Fibonacci;
use serde::{Deserialize, Serialize};
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::error::RelayerError;

// Default parameters for the retrying mechanism
pub const MAX_RETRIES: u32 = 5;
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(200);
pub const PROOF_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const PROOF_ATTEMPTS: u32 = 10;

/// How transient errors are retried.
///
/// Queries back off along a Fibonacci sequence starting at `initial_delay`,
/// each delay capped at `max_delay`, for at most `max_retries` retries.
/// Proofs that are not yet available are retried every `proof_delay`, for at
/// most `proof_attempts` attempts in total.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct RetryPolicy {
    #[builder(default = INITIAL_RETRY_DELAY)]
    pub initial_delay: Duration,
    #[builder(default = MAX_RETRY_DELAY)]
    pub max_delay: Duration,
    #[builder(default = MAX_RETRIES)]
    pub max_retries: u32,
    #[builder(default = PROOF_RETRY_DELAY)]
    pub proof_delay: Duration,
    #[builder(default = PROOF_ATTEMPTS)]
    pub proof_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Never retries.
    pub fn none() -> Self {
        Self::builder().max_retries(0).proof_attempts(1).build()
    }

    pub fn query_delays(&self) -> impl Iterator<Item = Duration> {
        Clamped::new(
            Fibonacci::from(self.initial_delay),
            self.max_delay,
            self.max_retries as usize,
        )
        .iter()
    }

    pub fn proof_delays(&self) -> impl Iterator<Item = Duration> {
        core::iter::repeat(self.proof_delay).take(self.proof_attempts.saturating_sub(1) as usize)
    }
}

/// A delay strategy bounded in the number of retries and in each delay.
#[derive(Copy, Clone, Debug)]
pub struct Clamped<S> {
    pub strategy: S,
    pub max_delay: Duration,
    pub max_retries: usize,
}

impl<S> Clamped<S> {
    pub const fn new(strategy: S, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            strategy,
            max_delay,
            max_retries,
        }
    }

    pub fn iter(self) -> impl Iterator<Item = Duration>
    where
        S: Iterator<Item = Duration>,
    {
        let Self {
            strategy,
            max_retries,
            max_delay,
        } = self;

        strategy
            .take(max_retries)
            .map(move |delay| delay.min(max_delay))
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// `delays` is exhausted. Waits the next delay between attempts.
pub async fn retry_transient<T, F, Fut>(
    delays: impl IntoIterator<Item = Duration>,
    what: &str,
    mut operation: F,
) -> Result<T, RelayerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RelayerError>>,
{
    let mut delays = delays.into_iter();
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => match delays.next() {
                Some(delay) => {
                    warn!(%what, attempt, ?delay, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use ibc_relayer_types::identifiers::ChainId;
    use test_log::test;

    use super::*;

    fn flaky(failures: u32, counter: &AtomicU32) -> Result<u32, RelayerError> {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= failures {
            Err(RelayerError::query(
                &ChainId::new("ibc-0").expect("valid chain id"),
                "connection reset",
            ))
        } else {
            Ok(attempt)
        }
    }

    #[test]
    fn fibonacci_delays_are_clamped() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(4))
            .max_retries(6)
            .build();

        let delays: Vec<u64> = policy.query_delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 4, 4]);
    }

    #[test]
    fn proof_delays_count_the_first_attempt() {
        let policy = RetryPolicy::builder().proof_attempts(3).build();
        assert_eq!(policy.proof_delays().count(), 2);
        assert_eq!(RetryPolicy::none().proof_delays().count(), 0);
    }

    #[test(tokio::test(start_paused = true))]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let result = retry_transient(RetryPolicy::default().query_delays(), "query", || async {
            flaky(2, &counter)
        })
        .await;

        assert_eq!(result.ok(), Some(3));
    }

    #[test(tokio::test(start_paused = true))]
    async fn gives_up_when_delays_are_exhausted() {
        let counter = AtomicU32::new(0);
        let result = retry_transient(RetryPolicy::none().query_delays(), "query", || async {
            flaky(1, &counter)
        })
        .await;

        assert!(matches!(result, Err(RelayerError::ChainQuery { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
