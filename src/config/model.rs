// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{MemoStorageMode, Overwrite};

/// Top-level pipeline file as read from TOML.
///
/// ```toml
/// [scheduler]
/// max_memory_gb = 16.0
/// max_threads = 8
///
/// [task.anat]
/// cmd = "./preprocess.sh anat"
/// memory_gb = 2.0
///
/// [task.skullstrip]
/// cmd = "./skullstrip.sh"
/// after = ["anat"]
/// threads = 4
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPipelineFile {
    /// Scheduler limits from `[scheduler]`.
    #[serde(default)]
    pub scheduler: RawSchedulerConfig,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[scheduler]` section before host defaults are applied.
///
/// Missing limits are filled in from the host when converted into a
/// [`SchedulerConfig`](crate::config::SchedulerConfig).
#[derive(Debug, Clone, Deserialize)]
pub struct RawSchedulerConfig {
    /// Defaults to 90% of physical memory.
    #[serde(default)]
    pub max_memory_gb: Option<f64>,

    /// Defaults to the number of logical cores.
    #[serde(default)]
    pub max_threads: Option<u32>,

    /// Defaults to `max_threads`.
    #[serde(default)]
    pub worker_pool_size: Option<usize>,

    /// Whether task bodies may start their own threads or child processes.
    #[serde(default = "default_true")]
    pub allow_nested_parallelism: bool,

    /// Consult the memo cache before admitting fingerprinted tasks.
    #[serde(default = "default_true")]
    pub local_hash_check: bool,

    #[serde(default)]
    pub memo_storage: MemoStorageMode,
}

fn default_true() -> bool {
    true
}

impl Default for RawSchedulerConfig {
    fn default() -> Self {
        Self {
            max_memory_gb: None,
            max_threads: None,
            worker_pool_size: None,
            allow_nested_parallelism: default_true(),
            local_hash_check: default_true(),
            memo_storage: MemoStorageMode::default(),
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command run as the task body.
    pub cmd: String,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub memory_gb: Option<f64>,

    #[serde(default)]
    pub threads: Option<u32>,

    /// Explicit fingerprint; takes precedence over `fingerprint_inputs`.
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// Files whose contents (together with `cmd`) make up the fingerprint.
    #[serde(default)]
    pub fingerprint_inputs: Vec<String>,

    /// Fixed fan-out count.
    #[serde(default)]
    pub multiplicity: Option<usize>,

    /// Fan out once per element of this dependency's JSON array result.
    #[serde(default)]
    pub multiplicity_from: Option<String>,

    #[serde(default)]
    pub run_inline: bool,

    #[serde(default)]
    pub always_run: bool,

    /// `"force"`, `"never"`, or absent to defer to `always_run`.
    #[serde(default)]
    pub overwrite: Option<Overwrite>,
}
