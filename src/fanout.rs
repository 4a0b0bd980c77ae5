// src/fanout.rs

//! Fan-out expansion: one admitted task becomes N independently scheduled
//! sub-tasks, joined back into the parent on completion.

use std::panic::{self, AssertUnwindSafe};

use anyhow::Context;
use tracing::{debug, info};

use crate::dag::TaskGraph;
use crate::dag::spec::Multiplicity;
use crate::engine::TaskFailure;
use crate::types::TaskId;

/// What admission should do with a task after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Not a fan-out (or resolved to a single instance): dispatch as is.
    Single,
    /// Expanded into these sub-tasks; the parent now waits on their join.
    Fanout(Vec<TaskId>),
    /// Resolved to zero instances; the parent completes with an empty join.
    Empty,
}

/// Determine the multiplicity of `id` and, if above one, add its sub-tasks
/// to the graph.
///
/// A failure to determine the count is reported as a crash of the parent
/// task; it never aborts the run.
pub fn expand(graph: &mut TaskGraph, id: &str) -> Result<Expansion, TaskFailure> {
    let Some(node) = graph.node(id) else {
        return Ok(Expansion::Single);
    };

    let count = match &node.spec.multiplicity {
        Multiplicity::Fixed(n) => *n,
        Multiplicity::Dynamic(resolve) => {
            let resolve = resolve.clone();
            let inputs = graph.dependency_inputs(id);

            match panic::catch_unwind(AssertUnwindSafe(|| resolve(&inputs))) {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => {
                    let err = err.context(format!("determining fan-out count for task '{id}'"));
                    return Err(TaskFailure::from_error(&err));
                }
                Err(payload) => return Err(TaskFailure::from_panic(payload)),
            }
        }
    };

    match count {
        0 => {
            info!(task = %id, "fan-out resolved to zero sub-tasks");
            Ok(Expansion::Empty)
        }
        1 => {
            debug!(task = %id, "single instance; no expansion");
            Ok(Expansion::Single)
        }
        n => {
            let children = graph.add_subtasks(id, n);
            info!(task = %id, subtasks = n, "expanded fan-out task");
            Ok(Expansion::Fanout(children))
        }
    }
}

/// Multiplicity resolver: one sub-task per element of `dependency`'s JSON
/// array result.
pub fn count_from_array(dependency: TaskId) -> Multiplicity {
    Multiplicity::dynamic(move |inputs| {
        let input = inputs
            .iter()
            .find(|input| input.task == dependency)
            .with_context(|| format!("dependency '{dependency}' has no result"))?;

        let items = input.value.as_array().with_context(|| {
            format!("result of '{dependency}' is not a JSON array: {}", input.value)
        })?;

        Ok(items.len())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::spec::TaskSpec;
    use crate::dag::{Completion, TaskState};
    use crate::exec::body::TaskContext;
    use serde_json::{Value, json};

    fn graph_with(multiplicity: Multiplicity) -> TaskGraph {
        let upstream = TaskSpec::from_fn("list", |_: &TaskContext| Ok(Value::Null));
        let mut fan = TaskSpec::from_fn("fan", |_: &TaskContext| Ok(Value::Null));
        fan.dependencies = vec!["list".into()];
        fan.multiplicity = multiplicity;

        let mut g = TaskGraph::new(vec![upstream, fan]).unwrap();
        g.ready_tasks();
        g.mark_done("list", json!(["s1", "s2", "s3", "s4"]), Completion::Executed);
        g.ready_tasks();
        g
    }

    #[test]
    fn fixed_multiplicity_expands() {
        let mut g = graph_with(Multiplicity::Fixed(3));
        let expansion = expand(&mut g, "fan").unwrap();
        assert_eq!(
            expansion,
            Expansion::Fanout(vec!["fan[0]".into(), "fan[1]".into(), "fan[2]".into()])
        );
        assert_eq!(g.state_of("fan"), Some(TaskState::Running));
        assert_eq!(g.node("fan[1]").unwrap().spec.dependencies, vec!["list"]);
    }

    #[test]
    fn dynamic_multiplicity_reads_upstream_array() {
        let mut g = graph_with(count_from_array("list".into()));
        match expand(&mut g, "fan").unwrap() {
            Expansion::Fanout(children) => assert_eq!(children.len(), 4),
            other => panic!("expected fan-out, got {other:?}"),
        }
    }

    #[test]
    fn resolver_error_is_a_task_failure() {
        let mut g = graph_with(count_from_array("missing".into()));
        let failure = expand(&mut g, "fan").unwrap_err();
        assert!(failure.error.contains("determining fan-out count"));
        assert_eq!(g.state_of("fan"), Some(TaskState::Ready));
    }

    #[test]
    fn resolver_panic_is_a_task_failure() {
        let mut g = graph_with(Multiplicity::dynamic(|_| panic!("no subjects")));
        let failure = expand(&mut g, "fan").unwrap_err();
        assert!(failure.error.contains("no subjects"));
    }

    #[test]
    fn zero_and_one_do_not_expand() {
        let mut g = graph_with(Multiplicity::dynamic(|_| Ok(0)));
        assert_eq!(expand(&mut g, "fan").unwrap(), Expansion::Empty);

        let mut g = graph_with(Multiplicity::dynamic(|_| Ok(1)));
        assert_eq!(expand(&mut g, "fan").unwrap(), Expansion::Single);
    }
}
