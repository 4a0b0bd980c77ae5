#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bundler::Bundler;
use bundler::dag::TaskSpec;
use bundler::engine::{RecordingEventSink, RunReport};
use bundler::errors::Result;
use tokio::sync::mpsc;

pub use bundler_test_utils::bodies;
pub use bundler_test_utils::builders::{TaskSpecBuilder, scheduler_config};
pub use bundler_test_utils::fake_executor::FakeExecutor;
pub use bundler_test_utils::{init_tracing, with_timeout};

/// Shorthand for `TaskSpecBuilder::new`.
pub fn task(id: &str) -> TaskSpecBuilder {
    TaskSpecBuilder::new(id)
}

/// A bundler with the given limits that records execution events.
pub fn recording_bundler(max_memory_gb: f64, max_threads: u32) -> (Bundler, Arc<RecordingEventSink>) {
    let sink = Arc::new(RecordingEventSink::new());
    let bundler = Bundler::new(scheduler_config(max_memory_gb, max_threads)).with_event_sink(sink.clone());
    (bundler, sink)
}

/// Run `tasks` through a [`FakeExecutor`], returning the report and the
/// dispatch order.
pub async fn run_fake(
    bundler: &Bundler,
    tasks: Vec<TaskSpec>,
    failing: &[&str],
) -> (Result<RunReport>, Vec<String>) {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    let executor = FakeExecutor::new(tx, Arc::clone(&executed)).failing(failing);

    let report = with_timeout(bundler.run_with(tasks, rx, executor)).await;
    let order = executed.lock().unwrap().clone();
    (report, order)
}
