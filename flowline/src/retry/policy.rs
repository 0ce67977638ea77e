//! The declarative retry policy attached at call sites.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// The status-code set sentinel standing for the whole server-error class.
const SERVER_ERROR_CLASS: u16 = 0;

/// Configuration for retrying a unit of work.
///
/// A policy is attached explicitly at the call site and handed to the engine
/// per invocation; the engine never caches it. Call sites without a policy
/// run their work exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub count: u32,
    /// Fixed delay between attempts, in seconds.
    pub delay_in_seconds: u64,
    /// Status codes that trigger a retry. The singleton set `{0}` stands for
    /// the server-error class (any status >= 500).
    pub status_codes: HashSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 1,
            delay_in_seconds: 1,
            status_codes: HashSet::from([SERVER_ERROR_CLASS]),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and default delay and
    /// status-code set.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// Sets the fixed inter-attempt delay in seconds.
    #[must_use]
    pub fn with_delay_in_seconds(mut self, delay_in_seconds: u64) -> Self {
        self.delay_in_seconds = delay_in_seconds;
        self
    }

    /// Replaces the retryable status-code set.
    #[must_use]
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = codes.into_iter().collect();
        self
    }

    /// The fixed inter-attempt delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_in_seconds)
    }

    /// The total number of invocations this policy allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }

    /// True when a result with the given status code should be retried.
    #[must_use]
    pub fn retries_on_status(&self, status: u16) -> bool {
        if self.status_codes.len() == 1 && self.status_codes.contains(&SERVER_ERROR_CLASS) {
            return status >= 500;
        }
        self.status_codes.contains(&status)
    }
}
