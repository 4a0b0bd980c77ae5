// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error(
        "Resource deadlock: task '{task}' needs {memory_gb} GB / {threads} threads \
         but the ledger only holds {max_memory_gb} GB / {max_threads} threads"
    )]
    ResourceDeadlock {
        task: TaskId,
        memory_gb: f64,
        threads: u32,
        max_memory_gb: f64,
        max_threads: u32,
    },

    #[error("Scheduler stalled: {0}")]
    Stalled(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BundlerError {
    /// Errors raised before the first tick: the run never starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BundlerError::ConfigError(_)
                | BundlerError::DagCycle(_)
                | BundlerError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BundlerError>;
