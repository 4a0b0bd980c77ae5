use std::sync::Arc;

use bundler::config::SchedulerConfig;
use bundler::dag::{Multiplicity, TaskSpec};
use bundler::exec::{TaskBody, TaskContext, TaskValue};
use bundler::fanout::count_from_array;
use bundler::types::{Overwrite, ResourceDemand};
use serde_json::json;

/// Builder for `TaskSpec` to simplify test setup.
///
/// The default body returns the task id as a JSON string.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            spec: TaskSpec::from_fn(id, |ctx: &TaskContext| Ok(json!(ctx.task))),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.spec.dependencies.push(dep.to_string());
        self
    }

    pub fn demand(mut self, memory_gb: f64, threads: u32) -> Self {
        self.spec.demand = ResourceDemand::new(memory_gb, threads);
        self
    }

    pub fn memory_gb(mut self, memory_gb: f64) -> Self {
        self.spec.demand.memory_gb = memory_gb;
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.spec.demand.threads = threads;
        self
    }

    pub fn fingerprint(mut self, fp: &str) -> Self {
        self.spec.fingerprint = Some(fp.to_string());
        self
    }

    pub fn multiplicity(mut self, n: usize) -> Self {
        self.spec.multiplicity = Multiplicity::Fixed(n);
        self
    }

    /// One sub-task per element of `dep`'s JSON array result.
    pub fn multiplicity_from(mut self, dep: &str) -> Self {
        self.spec.multiplicity = count_from_array(dep.to_string());
        self
    }

    pub fn dynamic_multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.spec.multiplicity = multiplicity;
        self
    }

    pub fn run_inline(mut self, val: bool) -> Self {
        self.spec.flags.run_inline = val;
        self
    }

    pub fn always_run(mut self, val: bool) -> Self {
        self.spec.flags.always_run = val;
        self
    }

    pub fn overwrite(mut self, val: Overwrite) -> Self {
        self.spec.flags.overwrite = val;
        self
    }

    pub fn body(mut self, body: Arc<dyn TaskBody>) -> Self {
        self.spec.body = body;
        self
    }

    pub fn body_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<TaskValue> + Send + Sync + 'static,
    {
        self.spec.body = Arc::new(f);
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

/// Scheduler limits with one worker per thread and nested parallelism on.
pub fn scheduler_config(max_memory_gb: f64, max_threads: u32) -> SchedulerConfig {
    SchedulerConfig::with_limits(max_memory_gb, max_threads)
        .expect("Failed to build valid scheduler config")
}
