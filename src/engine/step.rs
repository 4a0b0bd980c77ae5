// src/engine/step.rs

use crate::dag::ScheduledTask;

/// What the admission core decided during one tick.
#[derive(Debug, Default)]
pub struct AdmissionStep {
    /// Reserved tasks to hand to the worker pool.
    pub dispatched: Vec<ScheduledTask>,
    /// Reserved `run_inline` tasks the coordinator must run itself.
    pub inline: Vec<ScheduledTask>,
    /// Something changed state this tick (cache hit, expansion, dispatch,
    /// crash), so another tick may admit more without waiting.
    pub progressed: bool,
    /// No task is left to schedule or wait for.
    pub finished: bool,
}

impl AdmissionStep {
    pub fn admitted(&self) -> usize {
        self.dispatched.len() + self.inline.len()
    }
}
