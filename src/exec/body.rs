// src/exec/body.rs

//! Opaque task bodies and the context they run with.

use std::fmt;
use std::thread::JoinHandle;

use anyhow::{Context, Result, bail};

use crate::types::TaskId;

/// Value produced by a task body.
pub type TaskValue = serde_json::Value;

/// Result of a completed upstream dependency, handed to downstream bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInput {
    pub task: TaskId,
    pub value: TaskValue,
}

/// A unit of work executed by the worker pool (or inline on the coordinator).
///
/// Errors and panics are both contained by the executor and turned into a
/// failed task.
pub trait TaskBody: Send + Sync {
    fn run(&self, ctx: &TaskContext) -> Result<TaskValue>;
}

impl<F> TaskBody for F
where
    F: Fn(&TaskContext) -> Result<TaskValue> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> Result<TaskValue> {
        self(ctx)
    }
}

/// Everything a body may know about its own invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: TaskId,
    /// Fan-out parent, for expanded sub-tasks.
    pub parent: Option<TaskId>,
    /// Position within the parent's fan-out.
    pub fanout_index: Option<usize>,
    pub memory_gb: f64,
    pub threads: u32,
    /// Results of direct dependencies, in declaration order.
    pub inputs: Vec<TaskInput>,
    allow_nested: bool,
}

impl TaskContext {
    pub fn new(task: impl Into<TaskId>, allow_nested: bool) -> Self {
        Self {
            task: task.into(),
            parent: None,
            fanout_index: None,
            memory_gb: crate::types::DEFAULT_MEMORY_GB,
            threads: crate::types::DEFAULT_THREADS,
            inputs: Vec::new(),
            allow_nested,
        }
    }

    /// Whether this body may start further concurrent work of its own.
    pub fn allows_nested(&self) -> bool {
        self.allow_nested
    }

    /// Look up the result of a direct dependency by id.
    pub fn input(&self, task: &str) -> Option<&TaskValue> {
        self.inputs
            .iter()
            .find(|input| input.task == task)
            .map(|input| &input.value)
    }

    /// Spawn a nested thread from inside a task body.
    ///
    /// Fails when the pool was configured without nested parallelism.
    pub fn spawn_nested<F, T>(&self, f: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_nested_allowed()?;

        std::thread::Builder::new()
            .name(format!("{}-nested", self.task))
            .spawn(f)
            .with_context(|| format!("spawning nested thread for task '{}'", self.task))
    }

    pub(crate) fn ensure_nested_allowed(&self) -> Result<()> {
        if !self.allow_nested {
            bail!(
                "task '{}' attempted to spawn nested work but allow_nested_parallelism is disabled",
                self.task
            );
        }
        Ok(())
    }
}

/// Debug-friendly wrapper so types holding `Arc<dyn TaskBody>` can derive
/// nothing and still print something useful.
pub(crate) struct BodyDebug;

impl fmt::Debug for BodyDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<task body>")
    }
}
