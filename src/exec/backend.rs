// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of the worker pool
//! directly, so tests can swap in a fake executor that records dispatches
//! and emits completions itself.

use std::future::Future;
use std::pin::Pin;

use crate::dag::ScheduledTask;
use crate::errors::Result;

use super::pool::WorkerPool;

/// Trait abstracting how admitted tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Must not wait for the tasks to finish; completions are reported on
    /// the runtime's event channel.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl ExecutorBackend for WorkerPool {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for task in tasks {
                self.submit(task)?;
            }
            Ok(())
        })
    }
}
