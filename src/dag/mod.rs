// src/dag/mod.rs

//! Task DAG representation and per-task state machine.
//!
//! - [`spec`] defines the task list entries handed in by callers.
//! - [`graph`] holds the adjacency of the DAG.
//! - [`task_info`] provides task states, graph nodes and dispatch units.
//! - [`state_manager`] applies monotonic state transitions and failure
//!   propagation.
//! - [`task_graph`] owns all of the above for one run.

pub mod graph;
pub mod spec;
pub mod state_manager;
pub mod task_graph;
pub mod task_info;

pub use graph::DagGraph;
pub use spec::{Multiplicity, TaskSpec};
pub use task_graph::TaskGraph;
pub use task_info::{Completion, FailureKind, ScheduledTask, TaskNode, TaskState};
