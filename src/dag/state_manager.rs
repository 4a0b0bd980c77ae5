// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the graph.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::DagGraph;
use crate::dag::task_info::{FailureKind, TaskNode, TaskState};
use crate::types::TaskId;

/// Applies state transitions to the node map while keeping the
/// unmet-dependency counters consistent with the edges in the [`DagGraph`].
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    nodes: &'a mut HashMap<TaskId, TaskNode>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, nodes: &'a mut HashMap<TaskId, TaskNode>) -> Self {
        Self { graph, nodes }
    }

    /// Move `id` forward to `to`.
    ///
    /// Returns `false` (and leaves the node untouched) for unknown tasks,
    /// terminal tasks and backwards transitions.
    pub fn advance(&mut self, id: &str, to: TaskState) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            warn!(task = %id, "transition for unknown task; ignoring");
            return false;
        };

        if node.state.is_terminal() || to <= node.state {
            debug!(
                task = %id,
                from = ?node.state,
                to = ?to,
                "refusing non-monotonic transition"
            );
            return false;
        }

        node.state = to;
        true
    }

    /// Decrement the unmet-dependency counter of every direct dependent of
    /// `id`.
    pub fn release_dependents(&mut self, id: &str) {
        for dependent in self.graph.dependents_of(id) {
            if let Some(node) = self.nodes.get_mut(dependent) {
                node.unmet = node.unmet.saturating_sub(1);
            }
        }
    }

    /// Mark every non-terminal transitive dependent of `failed_task` as
    /// failed by propagation.
    ///
    /// Returns the tasks that were newly marked (excluding `failed_task`).
    pub fn mark_dependents_failed(&mut self, failed_task: &str) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.graph.dependents_of(failed_task).to_vec();
        let mut newly_failed = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&name) else {
                warn!(task = %name, "node in DAG not present in task map");
                continue;
            };

            match node.state {
                TaskState::Pending | TaskState::Ready => {
                    node.state = TaskState::Failed;
                    node.failure = Some(FailureKind::Propagated {
                        blocked_by: failed_task.to_string(),
                    });
                    debug!(
                        task = %name,
                        blocked_by = %failed_task,
                        "marking dependent as Failed due to upstream failure"
                    );
                    newly_failed.push(name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                TaskState::Dispatched | TaskState::Running => {
                    // Cannot happen while the dependency invariant holds.
                    warn!(
                        task = %name,
                        state = ?node.state,
                        "dependent of failed task is already in flight"
                    );
                }
                TaskState::Done | TaskState::Failed => {}
            }
        }

        newly_failed
    }

    /// Whether any direct dependency of `node` has failed.
    fn has_failed_dependency(&self, node: &TaskNode) -> bool {
        node.spec.dependencies.iter().any(|dep| {
            self.nodes
                .get(dep)
                .is_some_and(|d| d.state == TaskState::Failed)
        })
    }

    /// Move every `Pending` task with no unmet dependencies to `Ready`.
    ///
    /// `order` fixes the iteration order so results are deterministic.
    pub fn collect_new_ready_tasks(&mut self, order: &[TaskId]) -> Vec<TaskId> {
        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<TaskId> = order
            .iter()
            .filter(|id| {
                self.nodes.get(id.as_str()).is_some_and(|node| {
                    node.state == TaskState::Pending
                        && node.unmet == 0
                        && !self.has_failed_dependency(node)
                })
            })
            .cloned()
            .collect();

        for id in &candidates {
            if let Some(node) = self.nodes.get_mut(id) {
                node.state = TaskState::Ready;
                debug!(task = %id, "dependencies satisfied; marking Ready");
            }
        }

        candidates
    }
}
