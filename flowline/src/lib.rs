//! # Flowline
//!
//! An in-process task orchestration and resilience core for test-automation
//! frameworks.
//!
//! Flowline runs heterogeneous units of work (HTTP calls, database queries,
//! file operations) under mixed parallel/sequential scheduling, with support
//! for:
//!
//! - **Pipelined execution**: named tasks grouped into contiguous parallel
//!   batches on a shared worker pool, with an ordered result map
//! - **Per-call-site retries**: declarative policies judging transient
//!   failures, status codes, and response markers
//! - **Keyed mutual exclusion**: per-key permits serializing access to
//!   shared external resources, plus per-thread scratch storage
//! - **Singleton memoization**: race-free, at-most-one instance per type
//!   with idle and least-recently-used eviction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowline::prelude::*;
//!
//! let report = TaskPipeline::new()
//!     .sequential()
//!     .task("login", || async { login().await })
//!     .parallel()
//!     .task("card", || async { issue_card().await })
//!     .task("account", || async { open_account().await })
//!     .execute()
//!     .await?;
//!
//! let card: Card = report.get_as("card")?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod coordination;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod runtime;
pub mod singleton;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coordination::{KeyPermit, ResourceCoordinator};
    pub use crate::core::{
        BoxTaskFuture, CallResponse, ServiceResponse, TaskFn, TaskMode, TaskResult, TaskSpec,
    };
    pub use crate::errors::{
        AssertionFailure, ConstructError, FlowlineError, TransportError,
    };
    pub use crate::pipeline::{ExecutionReport, TaskPipeline};
    pub use crate::retry::{
        execute_with_retry, execute_with_retry_for, execute_with_retry_until_marker,
        retry_until, RetryPolicy,
    };
    pub use crate::runtime::{CoreConfig, CoreRuntime};
    pub use crate::singleton::{Singleton, SingletonCache};
}
