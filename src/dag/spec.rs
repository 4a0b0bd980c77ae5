// src/dag/spec.rs

//! Task list entries as handed to the scheduler by the caller.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::exec::body::{BodyDebug, TaskBody, TaskContext, TaskInput, TaskValue};
use crate::types::{ResourceDemand, TaskFlags, TaskId};

/// Resolver used by [`Multiplicity::Dynamic`].
pub type MultiplicityFn = dyn Fn(&[TaskInput]) -> Result<usize> + Send + Sync;

/// How many instances a task expands into at admission time.
#[derive(Clone)]
pub enum Multiplicity {
    /// A fixed count; values above 1 make the task a fan-out.
    Fixed(usize),
    /// Resolved from the dependency results when the task is admitted.
    Dynamic(Arc<MultiplicityFn>),
}

impl Multiplicity {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&[TaskInput]) -> Result<usize> + Send + Sync + 'static,
    {
        Multiplicity::Dynamic(Arc::new(f))
    }

    /// Whether admission has to go through the fan-out expander.
    pub fn needs_expansion(&self) -> bool {
        match self {
            Multiplicity::Fixed(n) => *n > 1,
            Multiplicity::Dynamic(_) => true,
        }
    }
}

impl Default for Multiplicity {
    fn default() -> Self {
        Multiplicity::Fixed(1)
    }
}

impl fmt::Debug for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Multiplicity::Fixed(n) => write!(f, "Fixed({n})"),
            Multiplicity::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// One entry of the task list.
#[derive(Clone)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Tasks that must be `Done` before this one becomes `Ready`.
    pub dependencies: Vec<TaskId>,
    pub demand: ResourceDemand,
    /// Content-derived summary of inputs and parameters; `None` never hits
    /// the memo cache.
    pub fingerprint: Option<String>,
    pub multiplicity: Multiplicity,
    pub flags: TaskFlags,
    pub body: Arc<dyn TaskBody>,
}

impl TaskSpec {
    /// A task with default demand, no dependencies and the given body.
    pub fn new(id: impl Into<TaskId>, body: Arc<dyn TaskBody>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            demand: ResourceDemand::default(),
            fingerprint: None,
            multiplicity: Multiplicity::default(),
            flags: TaskFlags::default(),
            body,
        }
    }

    /// Convenience for closure bodies.
    pub fn from_fn<F>(id: impl Into<TaskId>, f: F) -> Self
    where
        F: Fn(&TaskContext) -> Result<TaskValue> + Send + Sync + 'static,
    {
        Self::new(id, Arc::new(f))
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("demand", &self.demand)
            .field("fingerprint", &self.fingerprint)
            .field("multiplicity", &self.multiplicity)
            .field("flags", &self.flags)
            .field("body", &BodyDebug)
            .finish()
    }
}
