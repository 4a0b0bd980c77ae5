// src/exec/task_runner.rs

//! Individual task body runner.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskFailure, TaskOutcome};

/// Run the body of `task` on the current thread, containing errors and
/// panics.
pub fn execute(task: &ScheduledTask) -> TaskOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| task.body.run(&task.context))) {
        Ok(Ok(value)) => TaskOutcome::Success(value),
        Ok(Err(err)) => TaskOutcome::Failed(TaskFailure::from_error(&err)),
        Err(payload) => TaskOutcome::Failed(TaskFailure::from_panic(payload)),
    }
}

/// Run a single task on the blocking pool, emitting `TaskStarted` before and
/// `TaskCompleted` after the body.
///
/// Returns the outcome as well, for callers holding a job handle.
pub async fn run_task(
    task: ScheduledTask,
    runtime_tx: &mpsc::UnboundedSender<RuntimeEvent>,
) -> TaskOutcome {
    let id = task.id.clone();
    info!(
        task = %id,
        memory_gb = task.demand.memory_gb,
        threads = task.demand.threads,
        "starting task body"
    );

    if runtime_tx
        .send(RuntimeEvent::TaskStarted { task: id.clone() })
        .is_err()
    {
        debug!(task = %id, "runtime gone before task start");
    }

    let outcome = match tokio::task::spawn_blocking(move || execute(&task)).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            error!(task = %id, error = %join_err, "task body did not complete");
            TaskOutcome::Failed(TaskFailure::new(
                format!("task body did not complete: {join_err}"),
                format!("{join_err:?}"),
            ))
        }
    };

    info!(task = %id, success = outcome.is_success(), "task body finished");

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: id.clone(),
            outcome: outcome.clone(),
        })
        .is_err()
    {
        debug!(task = %id, "runtime gone before task completion");
    }

    outcome
}
