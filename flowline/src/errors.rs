//! Error types for the flowline orchestration core.
//!
//! The taxonomy distinguishes transient infrastructure failures (retryable
//! under a policy), assertion failures (never swallowed, always surfaced in
//! their original form), and configuration failures (fail fast, retry clean).

use std::error::Error as StdError;
use thiserror::Error;

/// The main error type for flowline operations.
#[derive(Debug, Error)]
pub enum FlowlineError {
    /// A test assertion failed.
    #[error("{0}")]
    Assertion(#[from] AssertionFailure),

    /// A transient infrastructure failure.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A task in a parallel batch failed; carries the original cause.
    #[error("task '{task}' failed")]
    TaskFailed {
        /// The name of the failed task.
        task: String,
        /// The original failure.
        #[source]
        source: Box<FlowlineError>,
    },

    /// Singleton construction failed for the named type.
    #[error("cannot create singleton for type {type_name}")]
    SingletonConstruct {
        /// The target type's name.
        type_name: &'static str,
        /// The construction failure.
        #[source]
        source: ConstructError,
    },

    /// No result was recorded under the requested task name.
    #[error("no result recorded for task '{0}'")]
    MissingResult(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A failure raised by an external collaborator.
    #[error("collaborator failure")]
    External(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// A generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FlowlineError {
    /// Wraps an arbitrary collaborator error.
    #[must_use]
    pub fn external(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::External(Box::new(err))
    }

    /// True when this error, or any cause in its chain, is a transient
    /// infrastructure failure worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        find_in_chain::<TransportError>(self).is_some()
    }

    /// Returns the assertion failure buried in this error's cause chain,
    /// if there is one.
    #[must_use]
    pub fn assertion(&self) -> Option<&AssertionFailure> {
        find_in_chain::<AssertionFailure>(self)
    }
}

/// A test-framework assertion failure.
///
/// Parallel batch aggregation surfaces this kind unchanged so the enclosing
/// test is classified as a failed assertion rather than a generic error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AssertionFailure {
    /// The assertion message.
    pub message: String,
}

impl AssertionFailure {
    /// Creates a new assertion failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The transient infrastructure failure family.
///
/// These are the only error kinds the retry engine treats as retryable on
/// their own; everything else propagates on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection was reset by the peer.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The connection closed before the response completed.
    #[error("connection closed before the response completed")]
    PrematureClose,

    /// No response was received from the remote endpoint.
    #[error("no response received from the remote endpoint")]
    NoResponse,
}

/// A singleton construction failure.
///
/// Cloneable so that every requester waiting on the same in-flight
/// construction can observe the one failure it produced.
#[derive(Debug, Clone)]
pub struct ConstructError {
    /// Description of what went wrong.
    pub message: String,
    source: Option<std::sync::Arc<dyn StdError + Send + Sync + 'static>>,
}

impl ConstructError {
    /// Creates a new construction error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a construction error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(std::sync::Arc::new(source)),
        }
    }
}

impl std::fmt::Display for ConstructError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for ConstructError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Walks an error's cause chain to its root.
///
/// The walk is guarded against self-referential cause cycles: a node seen
/// twice terminates the walk at that point.
#[must_use]
pub fn root_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut seen: Vec<*const ()> = Vec::new();
    let mut current = err;

    while let Some(next) = current.source() {
        let addr = (next as *const dyn StdError).cast::<()>();
        if seen.contains(&addr) {
            break;
        }
        seen.push(addr);
        current = next;
    }

    current
}

/// Finds the first node of type `T` in an error's cause chain, starting at
/// the error itself. Cycle-guarded like [`root_cause`].
#[must_use]
pub fn find_in_chain<'a, T: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut seen: Vec<*const ()> = Vec::new();
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);

    while let Some(node) = current {
        let addr = (node as *const dyn StdError).cast::<()>();
        if seen.contains(&addr) {
            return None;
        }
        seen.push(addr);

        if let Some(found) = node.downcast_ref::<T>() {
            return Some(found);
        }
        current = node.source();
    }

    None
}
