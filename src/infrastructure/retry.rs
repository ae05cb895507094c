//! Bounded retry with failure classification
//!
//! One policy instance is shared by listing fetches, detail fetches and
//! store writes so the retry budget and backoff durations cannot drift
//! between call sites. The loop is iterative with a decrementing budget:
//! stack depth and cancellation behavior stay predictable regardless of how
//! many attempts a flaky endpoint burns.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::config::RetryConfig;
use crate::infrastructure::errors::{FetchError, StoreError};

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Wait `backoff`, then try again. `throttled` marks rate-limit waits,
    /// which are always logged distinctly.
    Retry { backoff: Duration, throttled: bool },
    /// Propagate immediately.
    Fatal,
}

/// Classification seam between an error type and the retry loop.
pub trait ClassifyFailure {
    fn classify(&self, policy: &RetryPolicy) -> RetryDisposition;
}

impl ClassifyFailure for FetchError {
    fn classify(&self, policy: &RetryPolicy) -> RetryDisposition {
        match self {
            Self::Transient { .. } => RetryDisposition::Retry {
                backoff: policy.reset_backoff,
                throttled: false,
            },
            Self::RateLimited => RetryDisposition::Retry {
                backoff: policy.throttle_backoff,
                throttled: true,
            },
            Self::Permanent { .. } => RetryDisposition::Fatal,
        }
    }
}

impl ClassifyFailure for StoreError {
    fn classify(&self, policy: &RetryPolicy) -> RetryDisposition {
        match self {
            Self::Busy(_) => RetryDisposition::Retry {
                backoff: policy.reset_backoff,
                throttled: false,
            },
            Self::Backend(_) => RetryDisposition::Fatal,
        }
    }
}

/// Bounded retry policy with distinct backoffs for connection resets and
/// rate limiting.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    reset_backoff: Duration,
    throttle_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, reset_backoff: Duration, throttle_backoff: Duration) -> Self {
        Self { max_retries, reset_backoff, throttle_backoff }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.reset_backoff_secs),
            Duration::from_secs(config.throttle_backoff_secs),
        )
    }

    /// Execute `op` until it succeeds, fails fatally, or the retry budget is
    /// exhausted. An operation that keeps failing transiently is attempted
    /// exactly `max_retries + 1` times before the last error propagates.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: ClassifyFailure + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut remaining = self.max_retries;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let disposition = err.classify(self);
                    match disposition {
                        RetryDisposition::Fatal => return Err(err),
                        RetryDisposition::Retry { .. } if remaining == 0 => {
                            warn!("{label}: retry budget exhausted: {err}");
                            return Err(err);
                        }
                        RetryDisposition::Retry { backoff, throttled } => {
                            remaining -= 1;
                            if throttled {
                                warn!(
                                    "{label}: rate limited, backing off {backoff:?} \
                                     ({remaining} retries left)"
                                );
                            } else {
                                debug!("{label}: {err}, retrying in {backoff:?} ({remaining} left)");
                            }
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_secs(4), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_is_attempted_retries_plus_one_times() {
        let attempts = AtomicU32::new(0);
        let policy = quick_policy(3);

        let result: Result<(), FetchError> = policy
            .run("listing fetch", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::transient("connection reset")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_surfaces_immediately() {
        let attempts = AtomicU32::new(0);
        let policy = quick_policy(3);

        let result: Result<(), FetchError> = policy
            .run("detail fetch", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::permanent("HTTP 404")) }
            })
            .await;

        assert!(result.unwrap_err().is_permanent());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failures_returns_value() {
        let attempts = AtomicU32::new(0);
        let policy = quick_policy(3);

        let result: Result<u32, FetchError> = policy
            .run("detail fetch", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 { Err(FetchError::transient("timeout")) } else { Ok(42) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiting_waits_the_longer_backoff() {
        let attempts = AtomicU32::new(0);
        let policy = quick_policy(1);
        let started = tokio::time::Instant::now();

        let _: Result<(), FetchError> = policy
            .run("listing fetch", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::RateLimited) }
            })
            .await;

        // One throttle backoff (10s) elapsed on the paused clock.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn store_busy_is_retried_but_backend_errors_are_not() {
        let policy = quick_policy(2);

        let attempts = AtomicU32::new(0);
        let busy: Result<(), StoreError> = policy
            .run("store write", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Busy("database is locked".into())) }
            })
            .await;
        assert!(busy.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let attempts = AtomicU32::new(0);
        let backend: Result<(), StoreError> = policy
            .run("store write", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Backend(sqlx::Error::PoolClosed)) }
            })
            .await;
        assert!(backend.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
