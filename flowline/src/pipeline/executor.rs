//! The pipelined task executor.
//!
//! Tasks are queued with a name and a concurrency mode; `execute` scans them
//! in declared order, dispatching maximal contiguous runs of parallel tasks
//! as batches on the shared worker pool and running sequential tasks inline
//! on the caller.

use super::ExecutionReport;
use crate::core::{TaskMode, TaskResult, TaskSpec};
use crate::errors::{find_in_chain, AssertionFailure, FlowlineError};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Instant;
use tokio::task::JoinHandle;

/// An ordered queue of named units of work with mixed concurrency modes.
///
/// The pipeline carries a current default mode; `task` enqueues under it and
/// the `parallel`/`sequential` toggles switch it for subsequent tasks. New
/// pipelines start in parallel mode.
pub struct TaskPipeline {
    specs: Vec<TaskSpec>,
    mode: TaskMode,
}

impl TaskPipeline {
    /// Creates an empty pipeline in parallel mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            mode: TaskMode::Parallel,
        }
    }

    /// Switches the current default mode to parallel.
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.mode = TaskMode::Parallel;
        self
    }

    /// Switches the current default mode to sequential.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.mode = TaskMode::Sequential;
        self
    }

    /// Enqueues a named unit of work under the current default mode.
    #[must_use]
    pub fn task<F, Fut>(self, name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let mode = self.mode;
        self.task_with_mode(name, work, mode)
    }

    /// Enqueues a named unit of work under an explicit mode.
    #[must_use]
    pub fn task_with_mode<F, Fut>(
        mut self,
        name: impl Into<String>,
        work: F,
        mode: TaskMode,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.specs.push(TaskSpec::new(name, work, mode));
        self
    }

    /// Enqueues a raw spec, valid or not.
    ///
    /// Invalid specs (missing name or work) are skipped at execution time
    /// with no other observable effect.
    #[must_use]
    pub fn push(mut self, spec: TaskSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// The number of pending specs.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.specs.len()
    }

    /// Executes all pending tasks, consuming the pending list.
    ///
    /// A sequential task's failure propagates immediately and halts the
    /// remaining tasks. A parallel batch always runs every member to
    /// completion first; a panicking member (a failed test assertion) is
    /// re-raised unchanged once the batch has joined, and otherwise the
    /// first failure in declared order is surfaced: the buried
    /// [`AssertionFailure`] itself when the cause chain contains one,
    /// wrapped as [`FlowlineError::TaskFailed`] when it does not.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first failing task, per the rules above.
    pub async fn execute(&mut self) -> Result<ExecutionReport, FlowlineError> {
        let mut pending: VecDeque<TaskSpec> = std::mem::take(&mut self.specs).into();
        let mut report = ExecutionReport::new();
        let started = Instant::now();

        tracing::debug!(
            run_id = report.run_id(),
            tasks = pending.len(),
            "executing pipeline"
        );

        while let Some(spec) = pending.pop_front() {
            match spec.mode {
                TaskMode::Parallel => {
                    let mut batch = vec![spec];
                    while pending
                        .front()
                        .is_some_and(|next| next.mode == TaskMode::Parallel)
                    {
                        if let Some(next) = pending.pop_front() {
                            batch.push(next);
                        }
                    }
                    run_parallel_batch(batch, &mut report).await?;
                }
                TaskMode::Sequential => {
                    let Some((name, work)) = spec.into_parts() else {
                        continue;
                    };
                    tracing::debug!(task = %name, "running sequential task");
                    let value = work().await?;
                    report.insert(name, value);
                }
            }
        }

        report.set_duration_ms(started.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            run_id = report.run_id(),
            duration_ms = report.duration_ms(),
            "pipeline finished"
        );
        Ok(report)
    }
}

impl Default for TaskPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPipeline")
            .field("pending", &self.specs.len())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Dispatches one contiguous batch onto the shared worker pool and folds
/// the joined outcomes into the report.
async fn run_parallel_batch(
    batch: Vec<TaskSpec>,
    report: &mut ExecutionReport,
) -> Result<(), FlowlineError> {
    let mut named_handles: Vec<(String, JoinHandle<TaskResult>)> = Vec::new();
    for spec in batch {
        let Some((name, work)) = spec.into_parts() else {
            continue;
        };
        named_handles.push((name, tokio::spawn(work())));
    }

    if named_handles.is_empty() {
        return Ok(());
    }
    tracing::debug!(batch_size = named_handles.len(), "dispatching parallel batch");

    let (names, handles): (Vec<_>, Vec<_>) = named_handles.into_iter().unzip();
    let joined = futures::future::join_all(handles).await;

    // Every member has completed; only now is the batch allowed to fail.
    let mut panic_payload = None;
    let mut outcomes: Vec<(String, TaskResult)> = Vec::with_capacity(joined.len());
    for (name, joined_result) in names.into_iter().zip(joined) {
        match joined_result {
            Ok(result) => outcomes.push((name, result)),
            Err(join_err) if join_err.is_panic() => {
                if panic_payload.is_none() {
                    panic_payload = Some(join_err.into_panic());
                }
            }
            Err(join_err) => {
                let message = format!("task '{name}' aborted: {join_err}");
                outcomes.push((name, Err(FlowlineError::Internal(message))));
            }
        }
    }

    if let Some(payload) = panic_payload {
        std::panic::resume_unwind(payload);
    }

    let mut first_failure: Option<(String, FlowlineError)> = None;
    for (name, outcome) in outcomes {
        match outcome {
            Ok(value) => report.insert(name, value),
            Err(err) => {
                tracing::error!(task = %name, error = %err, "parallel task failed");
                if first_failure.is_none() {
                    first_failure = Some((name, err));
                }
            }
        }
    }

    match first_failure {
        Some((task, err)) => Err(reduce_batch_failure(task, err)),
        None => Ok(()),
    }
}

/// Chooses the batch's final disposition for its first failure.
fn reduce_batch_failure(task: String, err: FlowlineError) -> FlowlineError {
    if let Some(assertion) = find_in_chain::<AssertionFailure>(&err) {
        return FlowlineError::Assertion(assertion.clone());
    }
    FlowlineError::TaskFailed {
        task,
        source: Box::new(err),
    }
}
