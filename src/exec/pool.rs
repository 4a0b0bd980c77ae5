// src/exec/pool.rs

//! Fixed-size worker pool.
//!
//! `size` tokio worker tasks share one job queue. Each worker takes a job,
//! runs its body on the blocking thread pool via [`run_task`] and reports
//! the outcome on the per-run completion channel. The pool lives for one run
//! and is torn down by [`WorkerPool::shutdown`] (or on drop).

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::{BundlerError, Result};
use crate::exec::task_runner::run_task;
use crate::types::TaskId;

struct Job {
    task: ScheduledTask,
    reply: oneshot::Sender<TaskOutcome>,
}

/// Returned by [`WorkerPool::submit`]. Dropping it does not cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    task: TaskId,
    reply: oneshot::Receiver<TaskOutcome>,
}

impl JobHandle {
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Wait for the job's outcome. `None` if the pool shut down first.
    pub async fn outcome(self) -> Option<TaskOutcome> {
        self.reply.await.ok()
    }
}

pub struct WorkerPool {
    size: usize,
    job_tx: Option<mpsc::UnboundedSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("open", &self.job_tx.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Spawn `size` workers reporting to `runtime_tx`. Must be called from
    /// within a tokio runtime.
    pub fn new(size: usize, runtime_tx: mpsc::UnboundedSender<RuntimeEvent>) -> Self {
        let size = size.max(1);
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..size)
            .map(|index| {
                let jobs = Arc::clone(&job_rx);
                let tx = runtime_tx.clone();
                tokio::spawn(worker_loop(index, jobs, tx))
            })
            .collect();

        info!(workers = size, "worker pool started");
        Self {
            size,
            job_tx: Some(job_tx),
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `task` for execution and return immediately.
    pub fn submit(&self, task: ScheduledTask) -> Result<JobHandle> {
        let Some(job_tx) = &self.job_tx else {
            return Err(BundlerError::Stalled(format!(
                "worker pool is shut down; cannot submit task '{}'",
                task.id
            )));
        };

        let (reply, rx) = oneshot::channel();
        let id = task.id.clone();
        job_tx.send(Job { task, reply }).map_err(|_| {
            BundlerError::Stalled(format!("worker pool closed; cannot submit task '{id}'"))
        })?;

        debug!(task = %id, "submitted task to worker pool");
        Ok(JobHandle { task: id, reply: rx })
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        info!("worker pool shut down");
    }
}

async fn worker_loop(
    index: usize,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
) {
    debug!(worker = index, "worker started");

    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(Job { task, reply }) = job else {
            break;
        };

        let outcome = run_task(task, &runtime_tx).await;
        let _ = reply.send(outcome);
    }

    debug!(worker = index, "worker finished (job queue closed)");
}
