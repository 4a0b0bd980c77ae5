//! Canned task bodies.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use bundler::exec::{TaskBody, TaskContext, TaskValue};

/// Always returns `value`.
pub fn value(value: TaskValue) -> Arc<dyn TaskBody> {
    Arc::new(move |_: &TaskContext| -> Result<TaskValue> { Ok(value.clone()) })
}

/// Always returns an error with `msg`.
pub fn failing(msg: &'static str) -> Arc<dyn TaskBody> {
    Arc::new(move |_: &TaskContext| -> Result<TaskValue> { bail!(msg) })
}

/// Always panics with `msg`.
pub fn panicking(msg: &'static str) -> Arc<dyn TaskBody> {
    Arc::new(move |_: &TaskContext| -> Result<TaskValue> { panic!("{msg}") })
}

/// Counts invocations across every task sharing it.
#[derive(Debug, Default, Clone)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A body that bumps the counter and returns the task id.
    pub fn body(&self) -> Arc<dyn TaskBody> {
        let calls = Arc::clone(&self.calls);
        Arc::new(move |ctx: &TaskContext| -> Result<TaskValue> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(TaskValue::String(ctx.task.clone()))
        })
    }
}

/// Tracks how many threads are busy at once, as declared by the running
/// tasks' demands, and the peak seen.
#[derive(Debug, Default, Clone)]
pub struct LoadProbe {
    current_threads: Arc<AtomicU32>,
    peak_threads: Arc<AtomicU32>,
    current_mib: Arc<AtomicU32>,
    peak_mib: Arc<AtomicU32>,
}

impl LoadProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak_threads(&self) -> u32 {
        self.peak_threads.load(Ordering::SeqCst)
    }

    pub fn peak_memory_gb(&self) -> f64 {
        f64::from(self.peak_mib.load(Ordering::SeqCst)) / 1024.0
    }

    /// A body that holds its declared demand for `hold`.
    pub fn body(&self, hold: Duration) -> Arc<dyn TaskBody> {
        let probe = self.clone();
        Arc::new(move |ctx: &TaskContext| -> Result<TaskValue> {
            let mib = (ctx.memory_gb * 1024.0).round() as u32;
            let threads = probe.current_threads.fetch_add(ctx.threads, Ordering::SeqCst) + ctx.threads;
            probe.peak_threads.fetch_max(threads, Ordering::SeqCst);
            let mem = probe.current_mib.fetch_add(mib, Ordering::SeqCst) + mib;
            probe.peak_mib.fetch_max(mem, Ordering::SeqCst);

            std::thread::sleep(hold);

            probe.current_threads.fetch_sub(ctx.threads, Ordering::SeqCst);
            probe.current_mib.fetch_sub(mib, Ordering::SeqCst);
            Ok(TaskValue::String(ctx.task.clone()))
        })
    }
}
