// src/dag/graph.rs

use std::collections::HashMap;

use crate::dag::spec::TaskSpec;
use crate::types::TaskId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must be done before this one can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// Adjacency information for the task DAG, keyed by task id.
///
/// Acyclicity and reference validity are checked in
/// [`crate::config::validate`] before this is built; here we only keep the
/// edges for scheduling. Nodes can be added while a run is in progress
/// (fan-out sub-tasks), but never removed.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: HashMap<TaskId, DagNode>,
}

impl DagGraph {
    /// Build a DAG from a validated task list.
    pub fn from_specs(specs: &[TaskSpec]) -> Self {
        let mut graph = DagGraph::default();
        for spec in specs {
            graph.add_node(&spec.id, &spec.dependencies);
        }
        graph
    }

    /// Insert a node and wire it as a dependent of each of its deps.
    pub fn add_node(&mut self, id: &str, deps: &[TaskId]) {
        let node = self.nodes.entry(id.to_string()).or_default();
        node.deps = deps.to_vec();

        for dep in deps {
            self.nodes
                .entry(dep.clone())
                .or_default()
                .dependents
                .push(id.to_string());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Return all task ids.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
