//! Retrier for transient failures.
//!
//! Only errors that classify themselves as retriable are attempted again:
//! network failures while delivering a batch, HTTP 5xx responses, and the
//! connection-exception class of the relational backend. Everything else
//! short-circuits to the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classification hook driving [`Retrier::run`].
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

/// Performs 1 + `retries` attempts of an action with a growing backoff.
///
/// After each failed attempt the current interval is slept, then grown by
/// one second. Growth stops after five steps so a misconfigured retry count
/// cannot stretch the wait unboundedly.
pub struct Retrier {
    interval: Duration,
    retries: u32,
}

/// Number of interval growth steps after which the backoff stays flat.
const MAX_GROWTH_STEPS: u32 = 5;

impl Retrier {
    pub fn new(interval: Duration, retries: u32) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };

        Self { interval, retries }
    }

    /// Runs `f`, re-attempting on retriable errors. Returns the first
    /// success or the last error observed.
    pub async fn run<T, E, F, Fut>(&self, action: &str, mut f: F) -> Result<T, E>
    where
        E: Retriable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut interval = self.interval;
        let mut last = f().await;

        for attempt in 1..=self.retries {
            let retriable = match &last {
                Ok(_) => false,
                Err(err) => err.is_retriable(),
            };
            if !retriable {
                break;
            }

            tokio::time::sleep(interval).await;
            if attempt <= MAX_GROWTH_STEPS {
                interval += Duration::from_secs(1);
            }

            tracing::info!(action, attempt, "retrying");
            last = f().await;
        }

        last
    }
}

impl Default for Retrier {
    /// One second base interval, three additional attempts.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    impl Retriable for TestError {
        fn is_retriable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let retrier = Retrier::default();

        let result: Result<u32, TestError> = retrier
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(TestError::Transient)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        // Exactly three failures, then one success.
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let retrier = Retrier::default();

        let result: Result<(), TestError> = retrier
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let retrier = Retrier::new(Duration::from_millis(10), 3);

        let result: Result<(), TestError> = retrier
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient) }
            })
            .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let retrier = Retrier::new(Duration::from_secs(1), 0);

        let _: Result<(), TestError> = retrier
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
