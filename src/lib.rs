// src/lib.rs

pub mod bundler;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fanout;
pub mod ledger;
pub mod logging;
pub mod memo;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{config_root_dir, load_from_path};
use crate::config::model::RawPipelineFile;
use crate::config::Pipeline;
use crate::dag::Multiplicity;
use crate::engine::RunReport;

pub use crate::bundler::Bundler;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and CLI overrides
/// - the memo store selected by `[scheduler].memo_storage`
/// - one bundler run over the pipeline's tasks
pub async fn run(args: CliArgs) -> Result<RunReport> {
    let config_path = PathBuf::from(&args.config);
    let mut raw = load_from_path(&config_path)?;
    apply_overrides(&mut raw, &args);

    let pipeline = Pipeline::from_raw(raw, &config_root_dir(&config_path))?;

    if args.dry_run {
        print_dry_run(&pipeline);
        return Ok(RunReport::default());
    }

    let bundler = Bundler::new(pipeline.config.clone()).with_memo_root(&pipeline.root);
    let report = bundler.run(pipeline.tasks).await?;

    print_report(&report);
    if !report.is_success() {
        warn!(failed = report.failed.len(), "run finished with failed tasks");
    }
    Ok(report)
}

/// CLI flags win over `[scheduler]` values.
fn apply_overrides(raw: &mut RawPipelineFile, args: &CliArgs) {
    if let Some(gb) = args.max_memory_gb {
        raw.scheduler.max_memory_gb = Some(gb);
    }
    if let Some(threads) = args.max_threads {
        raw.scheduler.max_threads = Some(threads);
    }
    if let Some(workers) = args.workers {
        raw.scheduler.worker_pool_size = Some(workers);
    }
    if args.no_nested {
        raw.scheduler.allow_nested_parallelism = false;
    }
}

/// Dry-run output: scheduler limits, then tasks with their deps and commands.
fn print_dry_run(pipeline: &Pipeline) {
    let cfg = &pipeline.config;
    println!("bundler dry-run");
    println!("  scheduler.max_memory_gb = {:.2}", cfg.max_memory_gb);
    println!("  scheduler.max_threads = {}", cfg.max_threads);
    println!("  scheduler.worker_pool_size = {}", cfg.worker_pool_size);
    println!(
        "  scheduler.allow_nested_parallelism = {}",
        cfg.allow_nested_parallelism
    );
    println!("  scheduler.local_hash_check = {}", cfg.local_hash_check);
    println!("  scheduler.memo_storage = {:?}", cfg.memo_storage);
    println!();

    println!("tasks ({}):", pipeline.tasks.len());
    for task in &pipeline.tasks {
        println!("  - {}", task.id);
        if let Some(cmd) = pipeline.commands.get(&task.id) {
            println!("      cmd: {cmd}");
        }
        if !task.dependencies.is_empty() {
            println!("      after: {:?}", task.dependencies);
        }
        println!(
            "      demand: {} GB, {} thread(s)",
            task.demand.memory_gb, task.demand.threads
        );
        match &task.multiplicity {
            Multiplicity::Fixed(1) => {}
            Multiplicity::Fixed(n) => println!("      multiplicity: {n}"),
            Multiplicity::Dynamic(_) => println!("      multiplicity: from dependency result"),
        }
        if let Some(fp) = &task.fingerprint {
            println!("      fingerprint: {fp}");
        }
        if task.flags.run_inline {
            println!("      run_inline: true");
        }
        if task.flags.always_run {
            println!("      always_run: true");
        }
        println!("      overwrite: {:?}", task.flags.overwrite);
    }

    debug!("dry-run complete (no execution)");
}

/// One line per task on stdout.
fn print_report(report: &RunReport) {
    for done in &report.done {
        println!("done    {} ({:?}): {}", done.id, done.via, done.result);
    }
    for failed in &report.failed {
        println!("failed  {}: {}", failed.id, failed.error());
    }
    info!(
        done = report.done.len(),
        failed = report.failed.len(),
        dispatched = report.stats.dispatched,
        inline = report.stats.inline,
        cache_hits = report.stats.cache_hits,
        "summary"
    );
}
