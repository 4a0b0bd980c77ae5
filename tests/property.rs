// tests/property.rs

mod common;
use crate::common::{scheduler_config, task};

use std::collections::HashSet;

use bundler::dag::{TaskGraph, TaskSpec, TaskState};
use bundler::engine::{AdmissionCore, RuntimeEvent, TaskFailure, TaskOutcome};
use bundler::memo::MemoCache;
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::json;

const MAX_MEMORY_GB: f64 = 8.0;
const MAX_THREADS: u32 = 4;

type RawTask = (f64, u32, Vec<Index>, bool);

fn dag_strategy() -> impl Strategy<Value = Vec<RawTask>> {
    (1usize..14).prop_flat_map(|n| {
        prop::collection::vec(
            (
                0.1f64..4.0,
                1u32..=MAX_THREADS,
                prop::collection::vec(any::<Index>(), 0..3),
                prop::bool::weighted(0.15),
            ),
            n,
        )
    })
}

fn build(raw: &[RawTask]) -> (Vec<TaskSpec>, HashSet<String>) {
    let mut specs = Vec::new();
    let mut failing = HashSet::new();

    for (i, (mem, threads, deps, fails)) in raw.iter().enumerate() {
        let mut builder = task(&format!("t{i}")).demand(*mem, *threads);
        if i > 0 {
            let mut seen = HashSet::new();
            for dep in deps {
                let d = dep.index(i);
                if seen.insert(d) {
                    builder = builder.after(&format!("t{d}"));
                }
            }
        }
        if *fails {
            failing.insert(format!("t{i}"));
        }
        specs.push(builder.build());
    }

    (specs, failing)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn admission_keeps_capacity_and_dependency_invariants(
        raw in dag_strategy(),
        picks in prop::collection::vec(any::<Index>(), 64),
    ) {
        let (specs, failing) = build(&raw);
        let deps: Vec<(String, Vec<String>)> =
            specs.iter().map(|s| (s.id.clone(), s.dependencies.clone())).collect();

        let cfg = scheduler_config(MAX_MEMORY_GB, MAX_THREADS);
        let mut core = AdmissionCore::new(TaskGraph::new(specs).unwrap(), &cfg, MemoCache::in_memory());

        let mut in_flight: Vec<String> = Vec::new();
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut round = 0usize;

        while !core.is_finished() {
            let step = core.tick();
            prop_assert!(step.is_ok(), "tick failed: {:?}", step.err());
            let step = step.unwrap();

            prop_assert!(core.ledger().within_capacity());
            prop_assert!(core.ledger().committed_threads() <= MAX_THREADS);

            for t in step.dispatched.iter().chain(step.inline.iter()) {
                for dep in core.graph().dependencies_of(&t.id) {
                    prop_assert_eq!(core.graph().state_of(dep), Some(TaskState::Done));
                }
                prop_assert!(dispatched.insert(t.id.clone()), "{} dispatched twice", t.id);
                in_flight.push(t.id.clone());
            }

            if step.progressed || in_flight.is_empty() {
                continue;
            }

            let pick = picks[round % picks.len()].index(in_flight.len());
            round += 1;
            let id = in_flight.swap_remove(pick);

            core.handle_event(RuntimeEvent::TaskStarted { task: id.clone() });
            let outcome = if failing.contains(&id) {
                TaskOutcome::Failed(TaskFailure::new("injected", ""))
            } else {
                TaskOutcome::Success(json!(id))
            };
            core.handle_event(RuntimeEvent::TaskCompleted { task: id, outcome });
        }

        prop_assert!(core.ledger().is_idle());
        prop_assert!(in_flight.is_empty());

        for (id, task_deps) in &deps {
            let state = core.graph().state_of(id).unwrap();
            prop_assert!(state.is_terminal());

            let upstream_failed = task_deps
                .iter()
                .any(|d| core.graph().state_of(d) == Some(TaskState::Failed));
            if upstream_failed {
                prop_assert_eq!(state, TaskState::Failed);
                prop_assert!(!dispatched.contains(id), "{} ran after a failed dependency", id);
            }
            if failing.contains(id) && dispatched.contains(id) {
                prop_assert_eq!(state, TaskState::Failed);
            }
            if !failing.contains(id) && !upstream_failed {
                prop_assert_eq!(state, TaskState::Done);
            }
        }
    }
}
