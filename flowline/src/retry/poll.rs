//! Polling helpers for conditions that settle over time.

use crate::errors::FlowlineError;
use std::future::Future;
use std::time::Duration;

/// Evaluates `condition` up to `attempts` times with a fixed delay between
/// evaluations, returning whether it ever held.
///
/// A condition that errors counts as a failed evaluation; the error is
/// logged and swallowed so polling continues.
pub async fn retry_until<F, Fut>(attempts: u32, delay: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, FlowlineError>>,
{
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match condition().await {
            Ok(true) => return true,
            Ok(false) => {
                tracing::debug!(attempt, "condition not met yet");
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "condition evaluation failed");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    false
}

/// Retries `work` while it yields nothing, returning the first present
/// value or `None` once attempts are exhausted.
///
/// Errors from `work` are logged and treated like an absent result.
pub async fn execute_with_retry_for<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut work: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, FlowlineError>>,
{
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match work().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {
                tracing::debug!(attempt, "attempt returned empty, retrying");
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "attempt failed, retrying");
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    tracing::debug!(attempts, "all attempts exhausted, returning empty");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_until_succeeds_eventually() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let held = retry_until(5, Duration::ZERO, move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(count >= 2))
        })
        .await;

        assert!(held);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_until_exhausts() {
        let held = retry_until(3, Duration::ZERO, || std::future::ready(Ok(false))).await;
        assert!(!held);
    }

    #[tokio::test]
    async fn test_retry_until_swallows_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let held = retry_until(4, Duration::ZERO, move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if count < 2 {
                Err(FlowlineError::Internal("flaky probe".to_string()))
            } else {
                Ok(true)
            })
        })
        .await;

        assert!(held);
    }

    #[tokio::test]
    async fn test_execute_with_retry_for_returns_first_present() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let value = execute_with_retry_for(5, Duration::ZERO, move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok((count == 1).then(|| "found".to_string())))
        })
        .await;

        assert_eq!(value.as_deref(), Some("found"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_execute_with_retry_for_exhausts_to_none() {
        let value: Option<String> =
            execute_with_retry_for(3, Duration::ZERO, || std::future::ready(Ok(None))).await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_zero_attempts_still_evaluates_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let held = retry_until(0, Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(true))
        })
        .await;

        assert!(held);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
