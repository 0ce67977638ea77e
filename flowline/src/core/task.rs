//! Task descriptors queued into a pipeline.

use crate::errors::FlowlineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// The outcome of a single unit of work.
pub type TaskResult = Result<serde_json::Value, FlowlineError>;

/// A boxed future produced by a unit of work.
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;

/// A zero-argument unit of work.
pub type TaskFn = Box<dyn FnOnce() -> BoxTaskFuture + Send + 'static>;

/// Concurrency mode assigned to a task at add-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Runs as part of a contiguous batch on the shared worker pool.
    Parallel,
    /// Runs inline on the caller, to completion, before the next task.
    Sequential,
}

/// A named unit of work plus its concurrency mode.
///
/// A spec missing its name or its work is invalid; invalid specs are
/// silently skipped at execution time, never rejected at add-time.
pub struct TaskSpec {
    /// The result key for this task.
    pub name: Option<String>,
    /// The unit of work.
    pub work: Option<TaskFn>,
    /// The concurrency mode.
    pub mode: TaskMode,
}

impl TaskSpec {
    /// Creates a complete spec in the given mode.
    #[must_use]
    pub fn new<F, Fut>(name: impl Into<String>, work: F, mode: TaskMode) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        Self {
            name: Some(name.into()),
            work: Some(Box::new(move || -> BoxTaskFuture { Box::pin(work()) })),
            mode,
        }
    }

    /// Creates a spec with no work attached.
    #[must_use]
    pub fn unnamed(mode: TaskMode) -> Self {
        Self {
            name: None,
            work: None,
            mode,
        }
    }

    /// True when the spec carries both a name and a unit of work.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.name.is_some() && self.work.is_some()
    }

    /// Splits a valid spec into its name and work; `None` for invalid specs.
    #[must_use]
    pub fn into_parts(self) -> Option<(String, TaskFn)> {
        match (self.name, self.work) {
            (Some(name), Some(work)) => Some((name, work)),
            _ => None,
        }
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("work", &self.work.as_ref().map(|_| "<fn>"))
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_spec_is_valid() {
        let spec = TaskSpec::new("fetch", || async { Ok(serde_json::json!(1)) }, TaskMode::Parallel);
        assert!(spec.is_valid());
        assert!(spec.into_parts().is_some());
    }

    #[test]
    fn test_unnamed_spec_is_invalid() {
        let spec = TaskSpec::unnamed(TaskMode::Sequential);
        assert!(!spec.is_valid());
        assert!(spec.into_parts().is_none());
    }

    #[test]
    fn test_spec_without_work_is_invalid() {
        let spec = TaskSpec {
            name: Some("orphan".to_string()),
            work: None,
            mode: TaskMode::Parallel,
        };
        assert!(!spec.is_valid());
    }

    #[test]
    fn test_mode_serde_round_trip() {
        let json = serde_json::to_string(&TaskMode::Parallel).unwrap();
        assert_eq!(json, "\"parallel\"");
        let mode: TaskMode = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(mode, TaskMode::Sequential);
    }
}
