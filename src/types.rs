// src/types.rs

//! Small shared types used across the graph, ledger and config layers.

use std::str::FromStr;

use serde::Deserialize;

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Memory assumed for a task that does not declare `memory_gb`.
pub const DEFAULT_MEMORY_GB: f64 = 0.25;

/// Threads assumed for a task that does not declare `threads`.
pub const DEFAULT_THREADS: u32 = 1;

/// Memory and thread demand of a single task instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceDemand {
    pub memory_gb: f64,
    pub threads: u32,
}

impl ResourceDemand {
    pub fn new(memory_gb: f64, threads: u32) -> Self {
        Self { memory_gb, threads }
    }
}

impl Default for ResourceDemand {
    fn default() -> Self {
        Self {
            memory_gb: DEFAULT_MEMORY_GB,
            threads: DEFAULT_THREADS,
        }
    }
}

/// Tri-state rerun policy for memoized tasks.
///
/// - `Force`: always execute, never consult the memo cache.
/// - `Never`: reuse a cached completion whenever one exists, even for
///   `always_run` tasks.
/// - `Default`: defer to the task's `always_run` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overwrite {
    Force,
    Never,
    #[default]
    Default,
}

impl FromStr for Overwrite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "force" => Ok(Overwrite::Force),
            "never" => Ok(Overwrite::Never),
            "default" => Ok(Overwrite::Default),
            other => Err(format!(
                "invalid overwrite: {other} (expected \"force\", \"never\" or \"default\")"
            )),
        }
    }
}

/// Per-task execution flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFlags {
    /// Execute on the coordinator instead of the worker pool.
    pub run_inline: bool,
    /// Bypass memoization unless `overwrite = Never`.
    pub always_run: bool,
    pub overwrite: Overwrite,
}

/// Where memoized completion records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoStorageMode {
    /// Store records in a JSON file (`.bundler/memo.json`).
    File,
    /// Keep records in memory only (lost when the process exits).
    #[default]
    Memory,
}
