//! Bounded exponential backoff for job side effects.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use ticket_core::{Classify, ErrorKind};
use tokio_util::sync::CancellationToken;

use crate::QueueError;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    #[error(transparent)]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The error that ended the run, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Cancelled { .. } => None,
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Permanent(e) => Some(e),
        }
    }
}

impl<E: Classify> Classify for RetryError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            RetryError::Cancelled { .. } => ErrorKind::Transient,
            RetryError::Exhausted { last, .. } => last.kind(),
            RetryError::Permanent(e) => e.kind(),
        }
    }
}

/// Attempt `n` that fails waits `initial_delay * 2^(n-1)` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Read `RETRY_MAX_ATTEMPTS` and `RETRY_INITIAL_DELAY_MS`, falling back to defaults.
    pub fn from_env() -> Result<Self, QueueError> {
        let defaults = Self::default();
        let max_attempts = match std::env::var("RETRY_MAX_ATTEMPTS") {
            Ok(v) if !v.trim().is_empty() => v.trim().parse().map_err(|_| {
                QueueError::Config(format!("invalid RETRY_MAX_ATTEMPTS={v}"))
            })?,
            _ => defaults.max_attempts,
        };
        let initial_delay = match std::env::var("RETRY_INITIAL_DELAY_MS") {
            Ok(v) if !v.trim().is_empty() => {
                Duration::from_millis(v.trim().parse().map_err(|_| {
                    QueueError::Config(format!("invalid RETRY_INITIAL_DELAY_MS={v}"))
                })?)
            }
            _ => defaults.initial_delay,
        };
        Ok(Self::new(max_attempts, initial_delay))
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails permanently or the budget is spent.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::warn!(label, attempt, kind = %err.kind(), error = %err, "Permanent failure");
                return Err(RetryError::Permanent(err));
            }

            if attempt >= self.max_attempts {
                tracing::warn!(label, attempt, error = %err, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.delay_after(attempt);
            tracing::warn!(
                label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct TestError(ErrorKind);

    impl Classify for TestError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    fn counting_op(
        calls: &Arc<AtomicU32>,
        kind: ErrorKind,
        succeed_on: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, TestError>> {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= succeed_on {
                Ok(n)
            } else {
                Err(TestError(kind))
            })
        }
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_op_runs_three_times_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = RetryPolicy::default()
            .run(
                "test",
                &CancellationToken::new(),
                counting_op(&calls, ErrorKind::Transient, u32::MAX),
            )
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms, nothing after the final attempt.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = RetryPolicy::default()
            .run(
                "test",
                &CancellationToken::new(),
                counting_op(&calls, ErrorKind::Transient, 2),
            )
            .await;
        assert!(matches!(result, Ok(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = RetryPolicy::default()
            .run(
                "test",
                &CancellationToken::new(),
                counting_op(&calls, ErrorKind::NotFound, u32::MAX),
            )
            .await;
        assert!(matches!(result, Err(RetryError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };

        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let started = Instant::now();
        let result = policy
            .run(
                "test",
                &cancel,
                counting_op(&calls, ErrorKind::Transient, u32::MAX),
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(canceller.await.is_ok());
    }
}
