//! The retry engine applying a call-site policy to a unit of work.

use super::RetryPolicy;
use crate::core::ServiceResponse;
use crate::errors::FlowlineError;
use std::future::Future;

/// Runs `work` under the call site's retry policy.
///
/// With no policy the work runs exactly once. Otherwise each attempt is
/// retried when the work fails with a transient infrastructure error or
/// when the produced response's status code matches the policy's set; any
/// other error propagates immediately. The delay between attempts is fixed,
/// attempts are bounded by `count + 1`, and after exhaustion the last
/// response or transient error is handed back unchanged.
pub async fn execute_with_retry<R, F, Fut>(
    policy: Option<&RetryPolicy>,
    work: F,
) -> Result<R, FlowlineError>
where
    R: ServiceResponse,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, FlowlineError>>,
{
    let Some(policy) = policy else {
        let mut work = work;
        return work().await;
    };

    run_attempts(policy, work, |response: &R| {
        !policy.retries_on_status(response.status_code())
    })
    .await
}

/// Runs `work` under the call site's retry policy until the response body
/// contains `marker`.
///
/// The status-code set plays no part here; the success predicate is marker
/// presence alone. An empty marker is vacuously satisfied and never retries
/// on the result. Transient errors retry exactly as in
/// [`execute_with_retry`].
pub async fn execute_with_retry_until_marker<R, F, Fut>(
    policy: Option<&RetryPolicy>,
    marker: &str,
    work: F,
) -> Result<R, FlowlineError>
where
    R: ServiceResponse,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, FlowlineError>>,
{
    let Some(policy) = policy else {
        let mut work = work;
        return work().await;
    };

    run_attempts(policy, work, |response: &R| {
        marker.is_empty() || response.body_text().contains(marker)
    })
    .await
}

/// The shared attempt loop.
///
/// `accept` judges a produced response; a rejected response or a transient
/// error consumes an attempt, a non-transient error short-circuits.
async fn run_attempts<R, F, Fut, P>(
    policy: &RetryPolicy,
    mut work: F,
    mut accept: P,
) -> Result<R, FlowlineError>
where
    R: ServiceResponse,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, FlowlineError>>,
    P: FnMut(&R) -> bool,
{
    let delay = policy.delay();
    let mut attempt: u32 = 1;

    loop {
        let outcome = work().await;

        let should_retry = match &outcome {
            Ok(response) => {
                let acceptable = accept(response);
                if !acceptable {
                    tracing::warn!(
                        attempt,
                        status = response.status_code(),
                        "result not acceptable"
                    );
                }
                !acceptable
            }
            Err(err) => {
                let transient = err.is_transient();
                if transient {
                    tracing::warn!(attempt, error = %err, "transient failure");
                }
                transient
            }
        };

        if !should_retry || attempt >= policy.max_attempts() {
            return outcome;
        }

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
