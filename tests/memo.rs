// tests/memo.rs

mod common;
use crate::common::{bodies, init_tracing, recording_bundler, run_fake, scheduler_config, task, with_timeout};

use std::sync::Arc;

use bundler::Bundler;
use bundler::dag::{Completion, TaskSpec};
use bundler::memo::{FileMemoStore, MemoCache, MemoStore};
use bundler::types::Overwrite;
use serde_json::json;

fn pipeline(counter: &bodies::CallCounter) -> Vec<TaskSpec> {
    vec![
        task("anat").fingerprint("fp-anat").body(counter.body()).build(),
        task("skullstrip")
            .after("anat")
            .fingerprint("fp-skull")
            .demand(2.0, 2)
            .body(counter.body())
            .build(),
        task("stats")
            .after("skullstrip")
            .fingerprint("fp-stats")
            .body(counter.body())
            .build(),
    ]
}

#[tokio::test]
async fn second_run_is_served_entirely_from_cache() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(8.0, 4);
    let counter = bodies::CallCounter::new();

    let first = with_timeout(bundler.run(pipeline(&counter))).await.unwrap();
    assert!(first.is_success());
    assert_eq!(counter.calls(), 3);
    assert_eq!(bundler.memo().store().len().unwrap(), 3);

    let second = with_timeout(bundler.run(pipeline(&counter))).await.unwrap();
    assert!(second.is_success());
    assert_eq!(counter.calls(), 3);
    assert_eq!(second.stats.dispatched, 0);
    assert_eq!(second.stats.reservations, 0);
    assert_eq!(second.stats.cache_hits, 3);
    assert!(second.done.iter().all(|d| d.via == Completion::Cached));
    assert_eq!(second.result("stats"), first.result("stats"));
}

#[tokio::test]
async fn file_store_survives_across_bundlers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let counter = bodies::CallCounter::new();

    let make = || {
        Bundler::new(scheduler_config(8.0, 4))
            .with_memo(MemoCache::new(Arc::new(FileMemoStore::in_root(dir.path()))))
    };

    with_timeout(make().run(pipeline(&counter))).await.unwrap();
    assert!(dir.path().join(".bundler/memo.json").exists());

    let report = with_timeout(make().run(pipeline(&counter))).await.unwrap();
    assert_eq!(counter.calls(), 3);
    assert_eq!(report.stats.cache_hits, 3);
}

#[tokio::test]
async fn overwrite_policy_controls_cache_use() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(8.0, 4);

    let seed: Vec<TaskSpec> = ["forced", "always", "never", "plain"]
        .iter()
        .map(|id| task(id).fingerprint(&format!("fp-{id}")).build())
        .collect();
    with_timeout(bundler.run(seed)).await.unwrap();

    let rerun = vec![
        task("forced").fingerprint("fp-forced").overwrite(Overwrite::Force).build(),
        task("always").fingerprint("fp-always").always_run(true).build(),
        task("never")
            .fingerprint("fp-never")
            .always_run(true)
            .overwrite(Overwrite::Never)
            .build(),
        task("plain").fingerprint("fp-plain").build(),
        task("unfingerprinted").build(),
    ];

    let (report, mut order) = run_fake(&bundler, rerun, &[]).await;
    let report = report.unwrap();
    order.sort();

    assert_eq!(order, vec!["always", "forced", "unfingerprinted"]);
    assert_eq!(report.done_task("never").unwrap().via, Completion::Cached);
    assert_eq!(report.done_task("plain").unwrap().via, Completion::Cached);
    assert_eq!(report.done_task("forced").unwrap().via, Completion::Executed);
}

#[tokio::test]
async fn local_hash_check_off_disables_lookups() {
    init_tracing();
    let mut config = scheduler_config(8.0, 4);
    config.local_hash_check = false;
    let bundler = Bundler::new(config);
    let counter = bodies::CallCounter::new();

    with_timeout(bundler.run(pipeline(&counter))).await.unwrap();
    let report = with_timeout(bundler.run(pipeline(&counter))).await.unwrap();

    assert_eq!(counter.calls(), 6);
    assert_eq!(report.stats.cache_hits, 0);
    // Records are still written.
    assert_eq!(bundler.memo().store().len().unwrap(), 3);
}

#[tokio::test]
async fn broken_store_crashes_only_the_looked_up_task() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = FileMemoStore::in_root(dir.path());
    std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    std::fs::write(store.path(), "{ not json").unwrap();

    let bundler = Bundler::new(scheduler_config(8.0, 4)).with_memo(MemoCache::new(Arc::new(store)));
    let tasks = vec![
        task("cached").fingerprint("fp").build(),
        task("downstream").after("cached").build(),
        task("unrelated").build(),
    ];

    let report = with_timeout(bundler.run(tasks)).await.unwrap();
    assert_eq!(report.done_ids(), vec!["unrelated"]);

    let cached = report.failed_task("cached").unwrap();
    assert!(cached.error().contains("memo lookup for task 'cached'"));
    assert!(report.failed_task("downstream").unwrap().is_propagated());
}

#[tokio::test]
async fn cache_hits_feed_dependents() {
    init_tracing();
    let (bundler, _sink) = recording_bundler(8.0, 4);
    bundler
        .memo()
        .record(
            &task("subjects").fingerprint("fp-subjects").build(),
            &json!(["sub-01", "sub-02"]),
        )
        .unwrap();

    let tasks = vec![
        task("subjects").fingerprint("fp-subjects").build(),
        task("count")
            .after("subjects")
            .body_fn(|ctx| {
                let n = ctx
                    .input("subjects")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0);
                Ok(json!(n))
            })
            .build(),
    ];

    let report = with_timeout(bundler.run(tasks)).await.unwrap();
    assert_eq!(report.result("count"), Some(&json!(2)));
}
