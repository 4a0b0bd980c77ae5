// src/engine/mod.rs

//! Orchestration engine for bundler.
//!
//! This module ties together:
//! - the task graph and the resource ledger
//! - the memo cache and the fan-out expander
//! - the admission loop that reacts to task start/completion events
//!
//! The pure admission state machine lives in [`core`]; the async/IO shell
//! that talks to the executor is implemented in [`runtime`].

use std::any::Any;
use std::backtrace::Backtrace;

use crate::exec::body::TaskValue;
use crate::types::TaskId;

/// A crash captured at the executor/body boundary.
///
/// `error` is the one-line message (with causes); `traceback` carries the
/// full debug chain or the panic backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub error: String,
    pub traceback: String,
}

impl TaskFailure {
    pub fn new(error: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            traceback: traceback.into(),
        }
    }

    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::new(format!("{err:#}"), format!("{err:?}"))
    }

    /// Build a failure from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        let backtrace = Backtrace::force_capture();
        Self::new(
            format!("task panicked: {message}"),
            format!("panic: {message}\n{backtrace}"),
        )
    }
}

/// Outcome of a task body for the admission core.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(TaskValue),
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }
}

/// Events flowing into the runtime from the executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A worker picked the task up and is about to run its body.
    TaskStarted { task: TaskId },
    /// The body returned (or crashed).
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
}

pub mod core;
pub mod events;
pub mod report;
pub mod runtime;
pub mod step;

pub use core::AdmissionCore;
pub use events::{EventSink, ExecutionEvent, RecordingEventSink, TracingEventSink};
pub use report::{DoneTask, FailedTask, RunReport, RunStats};
pub use runtime::Runtime;
pub use step::AdmissionStep;
