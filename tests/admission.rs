// tests/admission.rs

mod common;
use crate::common::{bodies, init_tracing, recording_bundler, run_fake, task, with_timeout};

use std::time::Duration;

use bundler::errors::BundlerError;
use bundler::engine::ExecutionEvent;

#[tokio::test]
async fn head_of_line_admits_largest_first_and_waits() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(8.0, 4);

    let tasks = vec![
        task("B").demand(2.0, 1).build(),
        task("C").demand(2.0, 1).build(),
        task("A").demand(8.0, 4).build(),
    ];

    let (report, order) = run_fake(&bundler, tasks, &[]).await;
    let report = report.unwrap();

    // A fills the ledger on its own; B and C follow once it is released.
    assert_eq!(order, vec!["A", "B", "C"]);
    assert!(report.is_success());
    assert_eq!(report.stats.dispatched, 3);
}

#[tokio::test]
async fn real_pool_never_exceeds_capacity() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(4.0, 4);
    let probe = bodies::LoadProbe::new();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let mem = if i % 2 == 0 { 2.0 } else { 1.0 };
        tasks.push(
            task(&format!("t{i}"))
                .demand(mem, 1 + (i % 3))
                .body(probe.body(Duration::from_millis(30)))
                .build(),
        );
    }

    let report = with_timeout(bundler.run(tasks)).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.done.len(), 8);
    assert!(probe.peak_threads() <= 4, "peak threads {}", probe.peak_threads());
    assert!(probe.peak_memory_gb() <= 4.0, "peak memory {}", probe.peak_memory_gb());
}

#[tokio::test]
async fn dependencies_run_in_order_on_real_pool() {
    init_tracing();
    let (bundler, sink) = recording_bundler(8.0, 4);

    let tasks = vec![
        task("anat").build(),
        task("skullstrip").after("anat").build(),
        task("func").build(),
        task("register")
            .after("skullstrip")
            .after("func")
            .body_fn(|ctx| {
                let inputs: Vec<_> = ctx.inputs.iter().map(|i| i.task.clone()).collect();
                Ok(serde_json::json!(inputs))
            })
            .build(),
    ];

    let report = with_timeout(bundler.run(tasks)).await.unwrap();
    assert_eq!(
        report.result("register"),
        Some(&serde_json::json!(["skullstrip", "func"]))
    );

    let started = sink.started();
    let pos = |id: &str| started.iter().position(|s| s == id).unwrap();
    assert!(pos("anat") < pos("skullstrip"));
    assert!(pos("skullstrip") < pos("register"));
    assert!(pos("func") < pos("register"));
}

#[tokio::test]
async fn oversized_task_is_a_fatal_deadlock() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(8.0, 4);

    let tasks = vec![
        task("ok").demand(1.0, 1).build(),
        task("huge").after("ok").demand(1.0, 16).build(),
    ];

    let err = with_timeout(bundler.run(tasks)).await.unwrap_err();
    match err {
        BundlerError::ResourceDeadlock {
            task,
            threads,
            max_threads,
            ..
        } => {
            assert_eq!(task, "huge");
            assert_eq!(threads, 16);
            assert_eq!(max_threads, 4);
        }
        other => panic!("expected deadlock, got {other:?}"),
    }
}

#[tokio::test]
async fn inline_tasks_run_on_coordinator_and_release_capacity() {
    init_tracing();
    let (bundler, sink) = recording_bundler(2.0, 2);

    let tasks = vec![
        task("setup").run_inline(true).demand(2.0, 2).build(),
        task("work").after("setup").demand(2.0, 2).build(),
    ];

    let (report, order) = run_fake(&bundler, tasks, &[]).await;
    let report = report.unwrap();

    // Only pooled tasks reach the executor.
    assert_eq!(order, vec!["work"]);
    assert_eq!(report.stats.inline, 1);
    assert_eq!(report.stats.dispatched, 1);
    assert_eq!(report.stats.reservations, 2);
    assert!(
        sink.events()
            .contains(&ExecutionEvent::Started { task: "setup".into() })
    );
}

#[tokio::test]
async fn empty_task_list_finishes_immediately() {
    let (bundler, _sink) = recording_bundler(1.0, 1);
    let report = with_timeout(bundler.run(Vec::new())).await.unwrap();
    assert!(report.done.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn concurrent_runs_do_not_share_capacity() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(4.0, 2);

    let first = vec![task("a").demand(4.0, 2).build()];
    let second = vec![task("b").demand(4.0, 2).build()];

    let (left, right) = with_timeout(async {
        tokio::join!(bundler.run(first), bundler.run(second))
    })
    .await;

    assert!(left.unwrap().is_success());
    assert!(right.unwrap().is_success());
}
