// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`body`] defines the opaque `TaskBody` trait and its `TaskContext`.
//! - [`task_runner`] runs one body with panic/error containment.
//! - [`pool`] owns the fixed-size worker pool for a run.
//! - [`command`] provides shell command bodies used by pipeline files.
//! - [`backend`] provides the `ExecutorBackend` trait the runtime
//!   dispatches through, implemented by `WorkerPool` and by test fakes.

pub mod backend;
pub mod body;
pub mod command;
pub mod pool;
pub mod task_runner;

pub use backend::ExecutorBackend;
pub use body::{TaskBody, TaskContext, TaskInput, TaskValue};
pub use command::CommandBody;
pub use pool::{JobHandle, WorkerPool};
