// src/config/scheduler.rs

//! Validated scheduler limits and host capacity detection.

use std::fs;

use tracing::debug;

use crate::config::model::RawSchedulerConfig;
use crate::errors::Result;
use crate::types::MemoStorageMode;

/// Scheduler configuration, validated once at construction.
///
/// Build it from a [`RawSchedulerConfig`] via `TryFrom` (host defaults are
/// applied there) or with [`SchedulerConfig::with_limits`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub max_memory_gb: f64,
    pub max_threads: u32,
    pub worker_pool_size: usize,
    pub allow_nested_parallelism: bool,
    pub local_hash_check: bool,
    pub memo_storage: MemoStorageMode,
}

impl SchedulerConfig {
    /// Limits derived entirely from the host.
    pub fn from_host() -> Result<Self> {
        Self::try_from(RawSchedulerConfig::default())
    }

    /// Explicit memory and thread limits; the pool gets one worker per thread.
    pub fn with_limits(max_memory_gb: f64, max_threads: u32) -> Result<Self> {
        Self::try_from(RawSchedulerConfig {
            max_memory_gb: Some(max_memory_gb),
            max_threads: Some(max_threads),
            ..RawSchedulerConfig::default()
        })
    }
}

/// Physical memory in GB, read from `/proc/meminfo`.
///
/// Returns `None` where that file is unavailable.
pub fn host_memory_gb() -> Option<f64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    let gb = parse_mem_total_gb(&meminfo)?;
    debug!(host_memory_gb = gb, "detected host memory");
    Some(gb)
}

fn parse_mem_total_gb(meminfo: &str) -> Option<f64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: f64 = line
        .trim_start_matches("MemTotal:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kib / (1024.0 * 1024.0))
}

/// Logical core count, falling back to 1.
pub fn host_logical_cores() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}
