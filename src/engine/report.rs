// src/engine/report.rs

use crate::dag::{Completion, FailureKind, TaskState, TaskGraph};
use crate::exec::body::TaskValue;
use crate::types::TaskId;

/// A task that reached `Done`.
#[derive(Debug, Clone, PartialEq)]
pub struct DoneTask {
    pub id: TaskId,
    pub result: TaskValue,
    pub via: Completion,
}

/// A task that reached `Failed`, either by crashing or by propagation.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedTask {
    pub id: TaskId,
    pub kind: FailureKind,
}

impl FailedTask {
    pub fn error(&self) -> String {
        match &self.kind {
            FailureKind::Crash(failure) => failure.error.clone(),
            FailureKind::Propagated { blocked_by } => {
                format!("blocked by failed dependency '{blocked_by}'")
            }
        }
    }

    /// Captured traceback; `None` for propagated failures.
    pub fn traceback(&self) -> Option<&str> {
        match &self.kind {
            FailureKind::Crash(failure) => Some(&failure.traceback),
            FailureKind::Propagated { .. } => None,
        }
    }

    pub fn is_propagated(&self) -> bool {
        matches!(self.kind, FailureKind::Propagated { .. })
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Tasks handed to the executor.
    pub dispatched: usize,
    /// Tasks executed on the coordinator.
    pub inline: usize,
    pub cache_hits: usize,
    pub expanded: usize,
    /// Successful ledger reservations.
    pub reservations: u64,
}

/// Final outcome of a run. A non-empty `failed` list is a partial failure,
/// not an error.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub done: Vec<DoneTask>,
    pub failed: Vec<FailedTask>,
    pub stats: RunStats,
}

impl RunReport {
    pub(crate) fn from_graph(graph: &TaskGraph, stats: RunStats) -> Self {
        let mut report = RunReport {
            stats,
            ..RunReport::default()
        };

        for node in graph.nodes() {
            match node.state {
                TaskState::Done => report.done.push(DoneTask {
                    id: node.id().to_string(),
                    result: node.result.clone().unwrap_or(TaskValue::Null),
                    via: node.completion.unwrap_or(Completion::Executed),
                }),
                TaskState::Failed => {
                    if let Some(kind) = node.failure.clone() {
                        report.failed.push(FailedTask {
                            id: node.id().to_string(),
                            kind,
                        });
                    }
                }
                _ => {}
            }
        }

        report
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn result(&self, id: &str) -> Option<&TaskValue> {
        self.done.iter().find(|d| d.id == id).map(|d| &d.result)
    }

    pub fn done_task(&self, id: &str) -> Option<&DoneTask> {
        self.done.iter().find(|d| d.id == id)
    }

    pub fn failed_task(&self, id: &str) -> Option<&FailedTask> {
        self.failed.iter().find(|f| f.id == id)
    }

    pub fn done_ids(&self) -> Vec<&str> {
        self.done.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }
}
