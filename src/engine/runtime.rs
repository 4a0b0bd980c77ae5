// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::errors::{BundlerError, Result};
use crate::exec::ExecutorBackend;
use crate::exec::task_runner::execute;

use super::core::AdmissionCore;
use super::report::RunReport;
use super::RuntimeEvent;

/// Drives the [`AdmissionCore`] until every task is resolved, delegating
/// pooled execution to an `ExecutorBackend`.
///
/// This is the async/IO shell around the core: it hands admitted tasks to
/// the executor, runs `run_inline` tasks on the coordinator, and blocks on
/// the per-run completion channel whenever nothing else can be admitted.
pub struct Runtime<E: ExecutorBackend> {
    core: AdmissionCore,
    event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: AdmissionCore,
        event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    pub fn core(&self) -> &AdmissionCore {
        &self.core
    }

    /// Hand the executor back, e.g. to shut a worker pool down.
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Main loop.
    ///
    /// - Ticks the core and executes what it admitted.
    /// - Loops straight back when the tick made progress.
    /// - Otherwise suspends on the completion channel.
    pub async fn run(&mut self) -> Result<RunReport> {
        info!(tasks = self.core.graph().len(), "bundler run started");

        loop {
            let step = self.core.tick()?;

            if !step.dispatched.is_empty() {
                let ids: Vec<_> = step.dispatched.iter().map(|t| t.id.as_str()).collect();
                debug!(?ids, "dispatching tasks to executor");
                self.executor.spawn_ready_tasks(step.dispatched).await?;
            }

            let ran_inline = !step.inline.is_empty();
            for task in step.inline {
                self.run_inline(task);
            }

            if self.core.is_finished() {
                break;
            }

            if step.progressed || ran_inline {
                self.drain_completions();
                continue;
            }

            self.poll_completions().await?;
        }

        let report = self.core.report();
        info!(
            done = report.done.len(),
            failed = report.failed.len(),
            cache_hits = report.stats.cache_hits,
            "bundler run finished"
        );
        Ok(report)
    }

    /// Wait for at least one executor event, then apply it and everything
    /// else already queued. Returns the number of events applied.
    pub async fn poll_completions(&mut self) -> Result<usize> {
        let Some(event) = self.event_rx.recv().await else {
            return Err(BundlerError::Stalled(format!(
                "completion channel closed with {} task(s) in flight",
                self.core.in_flight()
            )));
        };

        debug!(?event, "runtime received event");
        self.core.handle_event(event);
        Ok(1 + self.drain_completions())
    }

    fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            debug!(?event, "runtime received event");
            self.core.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Run a `run_inline` task synchronously on the coordinator. Its
    /// reservation is released as soon as the body returns.
    fn run_inline(&mut self, task: ScheduledTask) {
        debug!(task = %task.id, "running task inline");
        self.core.start_task(&task.id);
        let outcome = execute(&task);
        self.core.complete_task(&task.id, outcome);
    }
}
