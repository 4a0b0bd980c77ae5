// src/dag/task_info.rs

//! Per-task state stored in the graph, and the dispatch unit handed to the
//! executor.

use std::fmt;
use std::sync::Arc;

use crate::dag::spec::TaskSpec;
use crate::engine::TaskFailure;
use crate::exec::body::{BodyDebug, TaskBody, TaskContext, TaskValue};
use crate::types::{ResourceDemand, TaskId};

/// Lifecycle of a task within one run.
///
/// Transitions only move forward:
/// `Pending -> Ready -> Dispatched -> Running -> {Done | Failed}`.
/// `Failed` may also be reached directly from `Pending` (propagation) or
/// `Ready` (crash before dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskState {
    Pending,
    Ready,
    Dispatched,
    Running,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// How a task reached `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The body ran and returned a value.
    Executed,
    /// A memoized record matched the fingerprint.
    Cached,
    /// Every fan-out sub-task finished.
    Joined,
}

/// Why a task reached `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// The task itself crashed (body error, panic, fan-out expansion or memo
    /// lookup failure).
    Crash(TaskFailure),
    /// The task never ran because an upstream dependency failed.
    Propagated { blocked_by: TaskId },
}

/// Join bookkeeping for an expanded fan-out parent.
#[derive(Debug, Clone)]
pub struct FanoutJoin {
    pub children: Vec<TaskId>,
    pub remaining: usize,
}

/// Graph node: static spec plus per-run state.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub spec: TaskSpec,
    pub state: TaskState,
    /// Direct dependencies not yet `Done`.
    pub unmet: usize,
    /// Memo lookup already performed for this run.
    pub memo_checked: bool,
    /// Fan-out parent, for expanded sub-tasks.
    pub parent: Option<TaskId>,
    pub fanout_index: Option<usize>,
    pub join: Option<FanoutJoin>,
    pub result: Option<TaskValue>,
    pub completion: Option<Completion>,
    pub failure: Option<FailureKind>,
}

impl TaskNode {
    pub fn new(spec: TaskSpec) -> Self {
        let unmet = spec.dependencies.len();
        Self {
            spec,
            state: TaskState::Pending,
            unmet,
            memo_checked: false,
            parent: None,
            fanout_index: None,
            join: None,
            result: None,
            completion: None,
            failure: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn demand(&self) -> ResourceDemand {
        self.spec.demand
    }
}

/// A task the coordinator wants executed now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub demand: ResourceDemand,
    pub run_inline: bool,
    pub body: Arc<dyn TaskBody>,
    pub context: TaskContext,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("demand", &self.demand)
            .field("run_inline", &self.run_inline)
            .field("body", &BodyDebug)
            .finish_non_exhaustive()
    }
}
