// src/config/pipeline.rs

//! Validated pipeline: scheduler limits plus the task list built from
//! `[task.<id>]` sections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{RawPipelineFile, TaskConfig};
use crate::config::scheduler::SchedulerConfig;
use crate::config::validate::validate_task_specs;
use crate::dag::{Multiplicity, TaskSpec};
use crate::errors::{BundlerError, Result};
use crate::exec::CommandBody;
use crate::fanout::count_from_array;
use crate::memo::compute_fingerprint;
use crate::types::{DEFAULT_MEMORY_GB, DEFAULT_THREADS, ResourceDemand, TaskFlags, TaskId};

/// A pipeline file after validation. Built once, then handed to the
/// bundler as is.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub config: SchedulerConfig,
    pub tasks: Vec<TaskSpec>,
    /// Shell command of each task, for dry-run output.
    pub commands: BTreeMap<TaskId, String>,
    /// Directory relative paths in the file are resolved against.
    pub root: PathBuf,
}

impl Pipeline {
    /// Apply host defaults, build one [`TaskSpec`] per `[task.<id>]` and
    /// validate the whole task list.
    pub fn from_raw(raw: RawPipelineFile, root: &Path) -> Result<Self> {
        let config = SchedulerConfig::try_from(raw.scheduler)?;

        let mut tasks = Vec::with_capacity(raw.task.len());
        let mut commands = BTreeMap::new();
        for (id, task) in raw.task {
            let spec = task_spec(&id, &task, root)?;
            commands.insert(id, task.cmd);
            tasks.push(spec);
        }

        validate_task_specs(&tasks)?;
        debug!(tasks = tasks.len(), root = ?root, "pipeline validated");

        Ok(Self {
            config,
            tasks,
            commands,
            root: root.to_path_buf(),
        })
    }
}

fn task_spec(id: &str, task: &TaskConfig, root: &Path) -> Result<TaskSpec> {
    if task.cmd.trim().is_empty() {
        return Err(BundlerError::ConfigError(format!(
            "task '{id}' has an empty cmd"
        )));
    }

    let mut spec = TaskSpec::new(id, Arc::new(CommandBody::new(task.cmd.clone())));
    spec.dependencies = task.after.clone();
    spec.demand = ResourceDemand::new(
        task.memory_gb.unwrap_or(DEFAULT_MEMORY_GB),
        task.threads.unwrap_or(DEFAULT_THREADS),
    );
    spec.flags = TaskFlags {
        run_inline: task.run_inline,
        always_run: task.always_run,
        overwrite: task.overwrite.unwrap_or_default(),
    };
    spec.multiplicity = multiplicity(id, task)?;
    spec.fingerprint = fingerprint(id, task, root)?;

    Ok(spec)
}

fn multiplicity(id: &str, task: &TaskConfig) -> Result<Multiplicity> {
    match (task.multiplicity, &task.multiplicity_from) {
        (Some(_), Some(_)) => Err(BundlerError::ConfigError(format!(
            "task '{id}' sets both multiplicity and multiplicity_from"
        ))),
        (Some(n), None) => Ok(Multiplicity::Fixed(n)),
        (None, Some(dep)) => {
            if !task.after.contains(dep) {
                return Err(BundlerError::ConfigError(format!(
                    "task '{id}' takes multiplicity_from '{dep}', which is not listed in after"
                )));
            }
            Ok(count_from_array(dep.clone()))
        }
        (None, None) => Ok(Multiplicity::Fixed(1)),
    }
}

/// Explicit `fingerprint` wins; otherwise hash `cmd` with the declared input
/// files. Tasks declaring neither are never memoized.
fn fingerprint(id: &str, task: &TaskConfig, root: &Path) -> Result<Option<String>> {
    if let Some(explicit) = &task.fingerprint {
        return Ok(Some(explicit.clone()));
    }
    if task.fingerprint_inputs.is_empty() {
        return Ok(None);
    }

    let inputs = task.fingerprint_inputs.iter().map(|p| root.join(p));
    compute_fingerprint(&task.cmd, inputs)
        .map(Some)
        .map_err(|err| {
            BundlerError::ConfigError(format!("fingerprinting task '{id}': {err:#}"))
        })
}
