// src/bundler.rs

//! Library entry point: run a task list to completion.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::dag::{TaskGraph, TaskSpec};
use crate::engine::{AdmissionCore, EventSink, RunReport, Runtime, RuntimeEvent, TracingEventSink};
use crate::errors::Result;
use crate::exec::{ExecutorBackend, WorkerPool};
use crate::memo::{FileMemoStore, MemoCache};
use crate::types::MemoStorageMode;

/// Resource-aware DAG executor.
///
/// A `Bundler` can run any number of task lists; each call to
/// [`Bundler::run`] builds its own graph, ledger, completion channel and
/// worker pool, so several runs may proceed concurrently. The memo store is
/// shared across runs.
#[derive(Clone)]
pub struct Bundler {
    config: SchedulerConfig,
    memo: MemoCache,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Bundler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("config", &self.config)
            .field("memo", &self.memo)
            .finish_non_exhaustive()
    }
}

impl Bundler {
    /// A bundler with an in-memory memo store.
    ///
    /// `memo_storage = file` in `config` is honoured by
    /// [`Bundler::with_memo_root`]; here it falls back to memory.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            memo: MemoCache::in_memory(),
            sink: Arc::new(TracingEventSink),
        }
    }

    /// Pick the memo store from `config.memo_storage`, keeping file records
    /// under `root`.
    pub fn with_memo_root(mut self, root: &std::path::Path) -> Self {
        self.memo = match self.config.memo_storage {
            MemoStorageMode::File => MemoCache::new(Arc::new(FileMemoStore::in_root(root))),
            MemoStorageMode::Memory => MemoCache::in_memory(),
        };
        self
    }

    pub fn with_memo(mut self, memo: MemoCache) -> Self {
        self.memo = memo;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn memo(&self) -> &MemoCache {
        &self.memo
    }

    /// Validate `tasks`, then schedule them on a fresh worker pool until
    /// every task is `Done` or `Failed`.
    ///
    /// Returns an error only for configuration problems and resource
    /// deadlock; task failures are listed in the report.
    pub async fn run(&self, tasks: Vec<TaskSpec>) -> Result<RunReport> {
        let core = self.core(tasks)?;

        let (rt_tx, rt_rx) = mpsc::unbounded_channel::<RuntimeEvent>();
        let pool = WorkerPool::new(self.config.worker_pool_size, rt_tx);

        // The pool owns every sender, so the channel closes with it.
        let mut runtime = Runtime::new(core, rt_rx, pool);
        let report = runtime.run().await;
        runtime.into_executor().shutdown().await;

        let report = report?;
        info!(
            done = report.done.len(),
            failed = report.failed.len(),
            "run complete"
        );
        Ok(report)
    }

    /// Like [`Bundler::run`], but dispatches through `executor`, which must
    /// report on the sender it was built with.
    pub async fn run_with<E: ExecutorBackend>(
        &self,
        tasks: Vec<TaskSpec>,
        event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
        executor: E,
    ) -> Result<RunReport> {
        let core = self.core(tasks)?;
        Runtime::new(core, event_rx, executor).run().await
    }

    fn core(&self, tasks: Vec<TaskSpec>) -> Result<AdmissionCore> {
        let graph = TaskGraph::new(tasks)?;
        Ok(AdmissionCore::new(graph, &self.config, self.memo.clone())
            .with_event_sink(Arc::clone(&self.sink)))
    }
}
