use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bundler::dag::ScheduledTask;
use bundler::engine::{RuntimeEvent, TaskFailure, TaskOutcome};
use bundler::errors::Result;
use bundler::exec::ExecutorBackend;
use serde_json::json;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were dispatched
/// - immediately reports `TaskStarted` and `TaskCompleted` for each one,
///   succeeding with the task id unless the id was marked as failing.
pub struct FakeExecutor {
    runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing.extend(ids.iter().map(|s| s.to_string()));
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.id.clone());

                let outcome = if self.failing.contains(&t.id) {
                    TaskOutcome::Failed(TaskFailure::new(
                        format!("fake failure of '{}'", t.id),
                        "fake traceback",
                    ))
                } else {
                    TaskOutcome::Success(json!(t.id))
                };

                tx.send(RuntimeEvent::TaskStarted { task: t.id.clone() })
                    .map_err(anyhow::Error::from)?;
                tx.send(RuntimeEvent::TaskCompleted {
                    task: t.id.clone(),
                    outcome,
                })
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
