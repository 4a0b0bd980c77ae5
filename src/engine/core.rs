// src/engine/core.rs

//! Pure admission state machine.
//!
//! The core owns the task graph, the resource ledger and the memo cache for
//! one run and is their only mutator. Each [`AdmissionCore::tick`]:
//! 1. promotes newly satisfied tasks to `Ready`
//! 2. completes `Ready` tasks straight from the memo cache where allowed
//! 3. sorts the remaining ready set by (memory desc, threads desc, id)
//! 4. reserves, expands and dispatches in that order, stopping at the first
//!    task that does not fit
//! 5. reports a deadlock when nothing was admitted, nothing is in flight
//!    and the ready set is not empty
//!
//! The async shell (`engine::runtime::Runtime`) feeds completions back in
//! via [`AdmissionCore::handle_event`]. The core has no channels and does
//! no IO apart from the memo store, so it can be driven directly in tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::dag::{Completion, FailureKind, ScheduledTask, TaskGraph, TaskState};
use crate::engine::events::{EventSink, ExecutionEvent, TracingEventSink};
use crate::engine::report::{RunReport, RunStats};
use crate::engine::step::AdmissionStep;
use crate::engine::{RuntimeEvent, TaskFailure, TaskOutcome};
use crate::errors::{BundlerError, Result};
use crate::exec::body::TaskValue;
use crate::fanout::{self, Expansion};
use crate::ledger::ResourceLedger;
use crate::memo::{MemoCache, MemoLookup};
use crate::types::{ResourceDemand, TaskId};

pub struct AdmissionCore {
    graph: TaskGraph,
    ledger: ResourceLedger,
    memo: MemoCache,
    /// Reservations held by dispatched tasks, released on completion.
    in_flight: HashMap<TaskId, ResourceDemand>,
    sink: Arc<dyn EventSink>,
    stats: RunStats,
    allow_nested: bool,
}

impl fmt::Debug for AdmissionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionCore")
            .field("tasks", &self.graph.len())
            .field("ledger", &self.ledger)
            .field("in_flight", &self.in_flight.keys().collect::<Vec<_>>())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl AdmissionCore {
    pub fn new(graph: TaskGraph, config: &SchedulerConfig, memo: MemoCache) -> Self {
        Self {
            graph,
            ledger: ResourceLedger::new(config.max_memory_gb, config.max_threads),
            memo: {
                let enabled = memo.lookups_enabled() && config.local_hash_check;
                memo.with_lookups(enabled)
            },
            in_flight: HashMap::new(),
            sink: Arc::new(TracingEventSink),
            stats: RunStats::default(),
            allow_nested: config.allow_nested_parallelism,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            reservations: self.ledger.reservations(),
            ..self.stats
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// No task is `Pending`, `Ready` or in flight.
    pub fn is_finished(&self) -> bool {
        self.graph.is_resolved()
    }

    /// Ready tasks still awaiting admission, in admission order.
    ///
    /// Runs the memo pass first, so cache hits (and whatever they unblock)
    /// are already `Done` when this returns.
    pub fn compute_ready_set(&mut self) -> Vec<TaskId> {
        self.memo_pass();
        self.sorted_ready()
    }

    /// Run one admission pass.
    ///
    /// Fails only with [`BundlerError::ResourceDeadlock`] or
    /// [`BundlerError::Stalled`]; task crashes are recorded in the graph.
    pub fn tick(&mut self) -> Result<AdmissionStep> {
        let mut step = AdmissionStep {
            progressed: self.memo_pass(),
            ..AdmissionStep::default()
        };

        let ready = self.sorted_ready();
        let mut blocked_at = None;

        for id in &ready {
            let Some(demand) = self.graph.node(id).map(|n| n.demand()) else {
                continue;
            };

            if !self.ledger.try_reserve(&demand) {
                debug!(
                    task = %id,
                    memory_gb = demand.memory_gb,
                    threads = demand.threads,
                    free_memory_gb = self.ledger.free_memory_gb(),
                    free_threads = self.ledger.free_threads(),
                    "task does not fit; stopping admission for this tick"
                );
                blocked_at = Some((id.clone(), demand));
                break;
            }

            match fanout::expand(&mut self.graph, id) {
                Err(failure) => {
                    self.ledger.release(&demand);
                    self.fail_task(id, failure);
                }
                Ok(Expansion::Empty) => {
                    self.ledger.release(&demand);
                    self.stats.expanded += 1;
                    self.sink.emit(ExecutionEvent::Expanded {
                        task: id.clone(),
                        subtasks: 0,
                    });
                    self.finish_task(id, TaskValue::Array(Vec::new()), Completion::Joined);
                }
                Ok(Expansion::Fanout(children)) => {
                    // The parent only waits on its join; children reserve
                    // for themselves once admitted.
                    self.ledger.release(&demand);
                    self.stats.expanded += 1;
                    self.sink.emit(ExecutionEvent::Expanded {
                        task: id.clone(),
                        subtasks: children.len(),
                    });
                }
                Ok(Expansion::Single) => {
                    let Some(task) = self.graph.scheduled_task(id, self.allow_nested) else {
                        self.ledger.release(&demand);
                        continue;
                    };
                    self.graph.mark_dispatched(id);
                    self.in_flight.insert(id.clone(), demand);

                    if task.run_inline {
                        self.stats.inline += 1;
                        step.inline.push(task);
                    } else {
                        self.stats.dispatched += 1;
                        step.dispatched.push(task);
                    }
                }
            }

            step.progressed = true;
        }

        if !step.progressed && self.in_flight.is_empty() {
            if let Some((task, demand)) = blocked_at {
                return Err(BundlerError::ResourceDeadlock {
                    task,
                    memory_gb: demand.memory_gb,
                    threads: demand.threads,
                    max_memory_gb: self.ledger.total_memory_gb(),
                    max_threads: self.ledger.total_threads(),
                });
            }
            if !self.graph.is_resolved() {
                return Err(BundlerError::Stalled(format!(
                    "{} pending, {} running, nothing in flight",
                    self.graph.count_in(TaskState::Pending),
                    self.graph.count_in(TaskState::Running),
                )));
            }
        }

        step.finished = self.is_finished();
        if step.admitted() > 0 {
            info!(
                dispatched = step.dispatched.len(),
                inline = step.inline.len(),
                committed_memory_gb = self.ledger.committed_memory_gb(),
                committed_threads = self.ledger.committed_threads(),
                "admitted tasks"
            );
        }
        Ok(step)
    }

    /// Apply a single event from the executor.
    pub fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::TaskStarted { task } => self.start_task(&task),
            RuntimeEvent::TaskCompleted { task, outcome } => self.complete_task(&task, outcome),
        }
    }

    pub fn start_task(&mut self, id: &str) {
        if self.graph.mark_running(id) {
            self.sink.emit(ExecutionEvent::Started {
                task: id.to_string(),
            });
        }
    }

    /// Release the task's reservation and record its outcome.
    pub fn complete_task(&mut self, id: &str, outcome: TaskOutcome) {
        let Some(demand) = self.in_flight.remove(id) else {
            warn!(task = %id, "completion for a task that is not in flight; ignoring");
            return;
        };
        self.ledger.release(&demand);

        match outcome {
            TaskOutcome::Success(value) => {
                self.finish_task(id, value, Completion::Executed);
            }
            TaskOutcome::Failed(failure) => self.fail_task(id, failure),
        }
    }

    /// Mark `id` as crashed, emitting events for it, the dependents failed
    /// by propagation and any fan-out parent that fails with it.
    fn fail_task(&mut self, id: &str, failure: TaskFailure) {
        for task in self.graph.mark_failed(id, failure) {
            let event = match self.graph.node(&task).and_then(|n| n.failure.clone()) {
                Some(FailureKind::Propagated { blocked_by }) => {
                    ExecutionEvent::Blocked { task, blocked_by }
                }
                Some(FailureKind::Crash(failure)) => ExecutionEvent::Crashed {
                    task,
                    error: failure.error,
                },
                None => continue,
            };
            self.sink.emit(event);
        }
    }

    /// Mark `id` as `Done` and memoize it, plus any fan-out parents joined by
    /// this completion.
    fn finish_task(&mut self, id: &str, value: TaskValue, how: Completion) {
        let joined = self.graph.mark_done(id, value, how);

        for task in std::iter::once(id.to_string()).chain(joined) {
            let Some(node) = self.graph.node(&task) else {
                continue;
            };
            if node.state != TaskState::Done {
                continue;
            }

            if let Some(result) = &node.result
                && let Err(err) = self.memo.record(&node.spec, result)
            {
                warn!(task = %task, error = %err, "failed to write memo record");
            }
            self.sink.emit(ExecutionEvent::Finished { task });
        }
    }

    /// Consult the memo cache for every ready task not yet checked this run,
    /// repeating while hits unblock further tasks.
    ///
    /// Returns whether any task changed state.
    fn memo_pass(&mut self) -> bool {
        let mut progressed = false;

        loop {
            self.graph.ready_tasks();

            let unchecked: Vec<TaskId> = self
                .graph
                .ready_set()
                .into_iter()
                .filter(|id| self.graph.node(id).is_some_and(|n| !n.memo_checked))
                .collect();

            let mut changed = false;
            for id in unchecked {
                self.graph.mark_memo_checked(&id);
                let Some(spec) = self.graph.node(&id).map(|n| n.spec.clone()) else {
                    continue;
                };

                match self.memo.lookup(&spec) {
                    Ok(MemoLookup::Hit(record)) => {
                        self.graph.mark_done(&id, record.result, Completion::Cached);
                        self.stats.cache_hits += 1;
                        self.sink.emit(ExecutionEvent::CacheHit { task: id });
                        changed = true;
                    }
                    Ok(MemoLookup::Miss | MemoLookup::Bypass) => {}
                    Err(err) => {
                        let err = err.context(format!("memo lookup for task '{id}'"));
                        self.fail_task(&id, TaskFailure::from_error(&err));
                        changed = true;
                    }
                }
            }

            if !changed {
                return progressed;
            }
            progressed = true;
        }
    }

    fn sorted_ready(&self) -> Vec<TaskId> {
        let mut ready: Vec<(TaskId, ResourceDemand)> = self
            .graph
            .ready_set()
            .into_iter()
            .filter_map(|id| {
                let demand = self.graph.node(&id)?.demand();
                Some((id, demand))
            })
            .collect();

        ready.sort_by(|(a_id, a), (b_id, b)| {
            b.memory_gb
                .partial_cmp(&a.memory_gb)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.threads.cmp(&a.threads))
                .then_with(|| a_id.cmp(b_id))
        });

        ready.into_iter().map(|(id, _)| id).collect()
    }

    /// Snapshot of every terminal task so far.
    pub fn report(&self) -> RunReport {
        RunReport::from_graph(&self.graph, self.stats())
    }

    pub fn into_report(self) -> RunReport {
        self.report()
    }

    /// Dispatch units for tasks currently in flight (used by tests that
    /// complete tasks by hand).
    pub fn in_flight_tasks(&self) -> Vec<ScheduledTask> {
        let mut ids: Vec<&TaskId> = self.in_flight.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.graph.scheduled_task(id, self.allow_nested))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::TaskSpec;
    use crate::engine::events::RecordingEventSink;
    use crate::exec::body::TaskContext;
    use crate::types::{Overwrite, ResourceDemand};
    use serde_json::{Value, json};

    fn spec(id: &str, deps: &[&str], memory_gb: f64, threads: u32) -> TaskSpec {
        let mut s = TaskSpec::from_fn(id, |_: &TaskContext| Ok(Value::Null));
        s.dependencies = deps.iter().map(|d| d.to_string()).collect();
        s.demand = ResourceDemand::new(memory_gb, threads);
        s
    }

    fn core(specs: Vec<TaskSpec>, mem: f64, threads: u32) -> AdmissionCore {
        let cfg = SchedulerConfig::with_limits(mem, threads).unwrap();
        AdmissionCore::new(TaskGraph::new(specs).unwrap(), &cfg, MemoCache::in_memory())
    }

    fn ids(step: &AdmissionStep) -> Vec<&str> {
        step.dispatched.iter().map(|t| t.id.as_str()).collect()
    }

    fn succeed(core: &mut AdmissionCore, id: &str) {
        core.handle_event(RuntimeEvent::TaskStarted { task: id.into() });
        core.handle_event(RuntimeEvent::TaskCompleted {
            task: id.into(),
            outcome: TaskOutcome::Success(json!(id)),
        });
    }

    #[test]
    fn head_of_line_blocks_smaller_tasks() {
        let mut c = core(
            vec![
                spec("B", &[], 2.0, 1),
                spec("A", &[], 8.0, 4),
                spec("C", &[], 2.0, 1),
            ],
            8.0,
            4,
        );

        let step = c.tick().unwrap();
        assert_eq!(ids(&step), vec!["A"]);

        // B and C wait for A's release even though nothing else changed.
        let step = c.tick().unwrap();
        assert!(step.dispatched.is_empty());
        assert!(!step.progressed);

        succeed(&mut c, "A");
        let step = c.tick().unwrap();
        assert_eq!(ids(&step), vec!["B", "C"]);
    }

    #[test]
    fn admission_order_is_memory_then_threads_then_id() {
        let mut c = core(
            vec![
                spec("small", &[], 1.0, 1),
                spec("wide", &[], 2.0, 3),
                spec("b", &[], 2.0, 1),
                spec("a", &[], 2.0, 1),
            ],
            100.0,
            100,
        );
        assert_eq!(c.compute_ready_set(), vec!["wide", "a", "b", "small"]);
    }

    #[test]
    fn oversized_task_is_a_deadlock() {
        let mut c = core(vec![spec("huge", &[], 64.0, 1)], 8.0, 4);
        match c.tick() {
            Err(BundlerError::ResourceDeadlock { task, .. }) => assert_eq!(task, "huge"),
            other => panic!("expected deadlock, got {other:?}"),
        }
    }

    #[test]
    fn capacity_released_on_completion() {
        let mut c = core(vec![spec("a", &[], 4.0, 2)], 8.0, 4);
        c.tick().unwrap();
        assert_eq!(c.ledger().committed_threads(), 2);
        succeed(&mut c, "a");
        assert!(c.ledger().is_idle());
        assert!(c.is_finished());
    }

    #[test]
    fn crash_propagates_and_emits_events() {
        let sink = Arc::new(RecordingEventSink::new());
        let mut c = core(
            vec![spec("a", &[], 1.0, 1), spec("b", &["a"], 1.0, 1), spec("c", &["b"], 1.0, 1)],
            8.0,
            4,
        )
        .with_event_sink(sink.clone());

        c.tick().unwrap();
        c.handle_event(RuntimeEvent::TaskCompleted {
            task: "a".into(),
            outcome: TaskOutcome::Failed(TaskFailure::new("boom", "trace")),
        });

        assert!(c.is_finished());
        let report = c.into_report();
        assert_eq!(report.failed_ids(), vec!["a", "b", "c"]);
        assert!(report.failed_task("b").unwrap().is_propagated());
        assert!(
            sink.events()
                .contains(&ExecutionEvent::Blocked { task: "c".into(), blocked_by: "a".into() })
        );
    }

    #[test]
    fn cache_hit_skips_reservation() {
        let memo = MemoCache::in_memory();
        let mut s = spec("a", &[], 1.0, 1);
        s.fingerprint = Some("fp-a".into());
        memo.record(&s, &json!("cached")).unwrap();

        let cfg = SchedulerConfig::with_limits(8.0, 4).unwrap();
        let mut c = AdmissionCore::new(TaskGraph::new(vec![s]).unwrap(), &cfg, memo);

        let step = c.tick().unwrap();
        assert!(step.progressed);
        assert!(step.dispatched.is_empty());
        assert!(step.finished);
        assert_eq!(c.stats().reservations, 0);
        assert_eq!(c.into_report().result("a"), Some(&json!("cached")));
    }

    #[test]
    fn forced_tasks_ignore_cache() {
        let memo = MemoCache::in_memory();
        let mut s = spec("a", &[], 1.0, 1);
        s.fingerprint = Some("fp-a".into());
        s.flags.overwrite = Overwrite::Force;
        memo.record(&s, &json!("cached")).unwrap();

        let cfg = SchedulerConfig::with_limits(8.0, 4).unwrap();
        let mut c = AdmissionCore::new(TaskGraph::new(vec![s]).unwrap(), &cfg, memo);
        assert_eq!(ids(&c.tick().unwrap()), vec!["a"]);
    }

    #[test]
    fn fanout_parent_joins_children_in_order() {
        let mut fan = spec("fan", &[], 2.0, 1);
        fan.multiplicity = crate::dag::Multiplicity::Fixed(3);
        let mut c = core(vec![fan, spec("after", &["fan"], 1.0, 1)], 4.0, 4);

        // Expansion happens on the first tick, children are admitted on the next.
        let step = c.tick().unwrap();
        assert!(step.dispatched.is_empty());
        assert!(c.ledger().is_idle());

        let step = c.tick().unwrap();
        assert_eq!(ids(&step), vec!["fan[0]", "fan[1]"]);

        for child in ["fan[1]", "fan[0]"] {
            succeed(&mut c, child);
        }
        let step = c.tick().unwrap();
        assert_eq!(ids(&step), vec!["fan[2]"]);
        succeed(&mut c, "fan[2]");

        assert_eq!(c.graph().state_of("fan"), Some(TaskState::Done));
        let step = c.tick().unwrap();
        assert_eq!(ids(&step), vec!["after"]);
        assert_eq!(
            step.dispatched[0].context.input("fan"),
            Some(&json!(["fan[0]", "fan[1]", "fan[2]"]))
        );
    }
}
