// src/engine/events.rs

//! Per-task execution events for external logging.

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::types::TaskId;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// The body is about to run (on a worker or inline).
    Started { task: TaskId },
    /// The task reached `Done` by execution or by fan-out join.
    Finished { task: TaskId },
    /// The task itself failed.
    Crashed { task: TaskId, error: String },
    /// The task reached `Done` from a memoized record.
    CacheHit { task: TaskId },
    /// The task will never run because `blocked_by` failed upstream.
    Blocked { task: TaskId, blocked_by: TaskId },
    /// A fan-out task was split into sub-tasks.
    Expanded { task: TaskId, subtasks: usize },
}

impl ExecutionEvent {
    pub fn task(&self) -> &str {
        match self {
            ExecutionEvent::Started { task }
            | ExecutionEvent::Finished { task }
            | ExecutionEvent::Crashed { task, .. }
            | ExecutionEvent::CacheHit { task }
            | ExecutionEvent::Blocked { task, .. }
            | ExecutionEvent::Expanded { task, .. } => task,
        }
    }
}

/// Receiver of [`ExecutionEvent`]s. Called from the coordinator only.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

/// Default sink: logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ExecutionEvent) {
        match event {
            ExecutionEvent::Started { task } => info!(task = %task, "task started"),
            ExecutionEvent::Finished { task } => info!(task = %task, "task finished"),
            ExecutionEvent::Crashed { task, error } => {
                error!(task = %task, error = %error, "task crashed")
            }
            ExecutionEvent::CacheHit { task } => info!(task = %task, "task completed from cache"),
            ExecutionEvent::Blocked { task, blocked_by } => {
                warn!(task = %task, blocked_by = %blocked_by, "task blocked by failed dependency")
            }
            ExecutionEvent::Expanded { task, subtasks } => {
                info!(task = %task, subtasks, "task fanned out")
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Ids of tasks that emitted `Started`, in order.
    pub fn started(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ExecutionEvent::Started { task } => Some(task),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: ExecutionEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
