// src/dag/task_graph.rs

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::validate::validate_task_specs;
use crate::dag::graph::DagGraph;
use crate::dag::spec::{Multiplicity, TaskSpec};
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{
    Completion, FailureKind, FanoutJoin, ScheduledTask, TaskNode, TaskState,
};
use crate::engine::TaskFailure;
use crate::errors::Result;
use crate::exec::body::{TaskContext, TaskInput, TaskValue};
use crate::types::TaskId;

/// The task DAG plus per-task state for one run.
///
/// Responsible for:
/// - tracking each task's state and unmet-dependency count
/// - promoting tasks to `Ready` once every dependency is `Done`
/// - failing dependents (transitively) when a task fails
/// - joining fan-out sub-tasks back into their parent
///
/// Only the coordinator mutates a `TaskGraph`.
#[derive(Debug)]
pub struct TaskGraph {
    graph: DagGraph,
    nodes: HashMap<TaskId, TaskNode>,
    /// Insertion order; sub-tasks are appended when a parent expands.
    order: Vec<TaskId>,
}

impl TaskGraph {
    /// Validate the task list and build the graph.
    ///
    /// Unknown or duplicate ids, invalid demands and cycles are rejected
    /// here, before any scheduling happens.
    pub fn new(specs: Vec<TaskSpec>) -> Result<Self> {
        validate_task_specs(&specs)?;

        let graph = DagGraph::from_specs(&specs);
        let order = specs.iter().map(|s| s.id.clone()).collect();
        let nodes = specs
            .into_iter()
            .map(|spec| (spec.id.clone(), TaskNode::new(spec)))
            .collect();

        Ok(Self {
            graph,
            nodes,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.nodes.get(id).map(|n| n.state)
    }

    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.graph.dependencies_of(id)
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.nodes.values().filter(|n| n.state == state).count()
    }

    /// All tasks have reached `Done` or `Failed`.
    pub fn is_resolved(&self) -> bool {
        self.nodes.values().all(|node| node.state.is_terminal())
    }

    /// Promote every `Pending` task whose dependencies are all `Done` to
    /// `Ready`, returning the newly promoted ids.
    pub fn ready_tasks(&mut self) -> Vec<TaskId> {
        let mut manager = StateManager::new(&self.graph, &mut self.nodes);
        manager.collect_new_ready_tasks(&self.order)
    }

    /// Every task currently `Ready`, in insertion order.
    pub fn ready_set(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.state_of(id) == Some(TaskState::Ready))
            .cloned()
            .collect()
    }

    /// Remember that the memo cache was consulted for `id` this run.
    pub fn mark_memo_checked(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.memo_checked = true;
        }
    }

    pub fn mark_dispatched(&mut self, id: &str) -> bool {
        StateManager::new(&self.graph, &mut self.nodes).advance(id, TaskState::Dispatched)
    }

    pub fn mark_running(&mut self, id: &str) -> bool {
        StateManager::new(&self.graph, &mut self.nodes).advance(id, TaskState::Running)
    }

    /// Mark `id` as `Done` with `result`.
    ///
    /// Returns fan-out parents that completed as a consequence (their
    /// last sub-task was `id`), outermost last.
    pub fn mark_done(
        &mut self,
        id: &str,
        result: TaskValue,
        completion: Completion,
    ) -> Vec<TaskId> {
        let mut joined = Vec::new();
        let mut current = Some((id.to_string(), result, completion));

        while let Some((task, value, how)) = current.take() {
            let mut manager = StateManager::new(&self.graph, &mut self.nodes);
            if !manager.advance(&task, TaskState::Done) {
                break;
            }
            manager.release_dependents(&task);

            let parent = match self.nodes.get_mut(&task) {
                Some(node) => {
                    node.result = Some(value);
                    node.completion = Some(how);
                    node.parent.clone()
                }
                None => None,
            };
            debug!(task = %task, completion = ?how, "task Done");

            if task != id {
                joined.push(task.clone());
            }

            if let Some(parent) = parent {
                current = self.record_child_done(&parent);
            }
        }

        joined
    }

    /// Decrement the parent's join counter; once it reaches zero, return the
    /// parent and its joined result so the caller can complete it.
    fn record_child_done(&mut self, parent: &str) -> Option<(TaskId, TaskValue, Completion)> {
        let node = self.nodes.get_mut(parent)?;
        if node.state.is_terminal() {
            return None;
        }

        let join = node.join.as_mut()?;
        join.remaining = join.remaining.saturating_sub(1);
        if join.remaining > 0 {
            return None;
        }

        let children = join.children.clone();
        let results: Vec<Value> = children
            .iter()
            .map(|child| {
                self.nodes
                    .get(child)
                    .and_then(|n| n.result.clone())
                    .unwrap_or(Value::Null)
            })
            .collect();

        info!(task = %parent, subtasks = children.len(), "fan-out joined");
        Some((parent.to_string(), Value::Array(results), Completion::Joined))
    }

    /// Mark `id` as crashed and fail everything downstream of it.
    ///
    /// Returns every task newly marked `Failed`, starting with `id`. A
    /// crashed fan-out sub-task also fails its parent (and the parent's
    /// dependents).
    pub fn mark_failed(&mut self, id: &str, failure: TaskFailure) -> Vec<TaskId> {
        let mut newly_failed = Vec::new();
        let mut current = Some((id.to_string(), failure));

        while let Some((task, failure)) = current.take() {
            let mut manager = StateManager::new(&self.graph, &mut self.nodes);
            if !manager.advance(&task, TaskState::Failed) {
                break;
            }
            manager.release_dependents(&task);
            let propagated = manager.mark_dependents_failed(&task);

            let parent = match self.nodes.get_mut(&task) {
                Some(node) => {
                    node.failure = Some(FailureKind::Crash(failure.clone()));
                    node.parent.clone()
                }
                None => None,
            };
            warn!(task = %task, error = %failure.error, "task Failed");

            newly_failed.push(task.clone());
            newly_failed.extend(propagated);

            if let Some(parent) = parent {
                newly_failed.extend(self.fail_waiting_siblings(&parent, &task));
                let parent_failure = TaskFailure::new(
                    format!("fan-out sub-task '{task}' failed: {}", failure.error),
                    failure.traceback,
                );
                current = Some((parent, parent_failure));
            }
        }

        newly_failed
    }

    /// Fail the sub-tasks of `parent` that have not been admitted yet: the
    /// join can no longer succeed once `crashed` has failed.
    fn fail_waiting_siblings(&mut self, parent: &str, crashed: &str) -> Vec<TaskId> {
        let siblings = self
            .nodes
            .get(parent)
            .and_then(|node| node.join.as_ref())
            .map(|join| join.children.clone())
            .unwrap_or_default();

        let mut failed = Vec::new();
        for sibling in siblings {
            if !matches!(
                self.state_of(&sibling),
                Some(TaskState::Pending | TaskState::Ready)
            ) {
                continue;
            }

            let mut manager = StateManager::new(&self.graph, &mut self.nodes);
            if !manager.advance(&sibling, TaskState::Failed) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&sibling) {
                node.failure = Some(FailureKind::Propagated {
                    blocked_by: crashed.to_string(),
                });
            }
            failed.push(sibling);
        }

        if !failed.is_empty() {
            debug!(task = %parent, skipped = ?failed, "dropping sub-tasks of failed fan-out");
        }
        failed
    }

    /// Expand `parent` into `count` sub-tasks sharing its dependencies and
    /// demand. The parent moves to `Running` and completes on the join.
    pub fn add_subtasks(&mut self, parent: &str, count: usize) -> Vec<TaskId> {
        let Some(parent_node) = self.nodes.get(parent) else {
            warn!(task = %parent, "expansion of unknown task; ignoring");
            return Vec::new();
        };

        let template = parent_node.spec.clone();
        let mut children = Vec::with_capacity(count);

        for index in 0..count {
            let child_id = format!("{parent}[{index}]");
            let mut spec = template.clone();
            spec.id = child_id.clone();
            spec.fingerprint = None;
            spec.multiplicity = Multiplicity::Fixed(1);

            self.graph.add_node(&child_id, &spec.dependencies);

            let mut node = TaskNode::new(spec);
            node.unmet = self.unmet_count(&node.spec.dependencies);
            node.parent = Some(parent.to_string());
            node.fanout_index = Some(index);

            self.nodes.insert(child_id.clone(), node);
            self.order.push(child_id.clone());
            children.push(child_id);
        }

        if let Some(node) = self.nodes.get_mut(parent) {
            node.join = Some(FanoutJoin {
                children: children.clone(),
                remaining: count,
            });
        }

        let mut manager = StateManager::new(&self.graph, &mut self.nodes);
        manager.advance(parent, TaskState::Dispatched);
        manager.advance(parent, TaskState::Running);

        children
    }

    fn unmet_count(&self, deps: &[TaskId]) -> usize {
        deps.iter()
            .filter(|dep| self.state_of(dep) != Some(TaskState::Done))
            .count()
    }

    /// Results of the direct dependencies of `id`, in declaration order.
    pub fn dependency_inputs(&self, id: &str) -> Vec<TaskInput> {
        self.graph
            .dependencies_of(id)
            .iter()
            .filter_map(|dep| {
                let node = self.nodes.get(dep)?;
                Some(TaskInput {
                    task: dep.clone(),
                    value: node.result.clone().unwrap_or(Value::Null),
                })
            })
            .collect()
    }

    /// Build the dispatch unit for `id`.
    pub fn scheduled_task(&self, id: &str, allow_nested: bool) -> Option<ScheduledTask> {
        let node = self.nodes.get(id)?;

        let mut context = TaskContext::new(id, allow_nested);
        context.parent = node.parent.clone();
        context.fanout_index = node.fanout_index;
        context.memory_gb = node.spec.demand.memory_gb;
        context.threads = node.spec.demand.threads;
        context.inputs = self.dependency_inputs(id);

        Some(ScheduledTask {
            id: id.to_string(),
            demand: node.spec.demand,
            run_inline: node.spec.flags.run_inline,
            body: node.spec.body.clone(),
            context,
        })
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }
}
