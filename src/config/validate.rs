// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::RawSchedulerConfig;
use crate::config::scheduler::{SchedulerConfig, host_logical_cores, host_memory_gb};
use crate::dag::spec::{Multiplicity, TaskSpec};
use crate::errors::{BundlerError, Result};

/// Share of physical memory the scheduler may commit by default.
pub const HOST_MEMORY_FRACTION: f64 = 0.9;

impl TryFrom<RawSchedulerConfig> for SchedulerConfig {
    type Error = BundlerError;

    fn try_from(raw: RawSchedulerConfig) -> std::result::Result<Self, Self::Error> {
        let max_memory_gb = match raw.max_memory_gb {
            Some(gb) => gb,
            None => host_memory_gb()
                .map(|gb| gb * HOST_MEMORY_FRACTION)
                .ok_or_else(|| {
                    BundlerError::ConfigError(
                        "[scheduler].max_memory_gb is required: host memory could not be determined"
                            .to_string(),
                    )
                })?,
        };

        let max_threads = raw.max_threads.unwrap_or_else(host_logical_cores);
        let worker_pool_size = raw.worker_pool_size.unwrap_or(max_threads as usize);

        let cfg = SchedulerConfig {
            max_memory_gb,
            max_threads,
            worker_pool_size,
            allow_nested_parallelism: raw.allow_nested_parallelism,
            local_hash_check: raw.local_hash_check,
            memo_storage: raw.memo_storage,
        };
        validate_scheduler_config(&cfg)?;
        Ok(cfg)
    }
}

pub fn validate_scheduler_config(cfg: &SchedulerConfig) -> Result<()> {
    if !cfg.max_memory_gb.is_finite() || cfg.max_memory_gb <= 0.0 {
        return Err(BundlerError::ConfigError(format!(
            "[scheduler].max_memory_gb must be > 0 (got {})",
            cfg.max_memory_gb
        )));
    }

    if cfg.max_threads == 0 {
        return Err(BundlerError::ConfigError(
            "[scheduler].max_threads must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.worker_pool_size == 0 {
        return Err(BundlerError::ConfigError(
            "[scheduler].worker_pool_size must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

/// Check a task list before a graph is built from it.
pub fn validate_task_specs(specs: &[TaskSpec]) -> Result<()> {
    validate_unique_ids(specs)?;
    validate_demands(specs)?;
    validate_task_dependencies(specs)?;
    validate_dag(specs)?;
    Ok(())
}

fn validate_unique_ids(specs: &[TaskSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if spec.id.is_empty() {
            return Err(BundlerError::ConfigError(
                "task ids must not be empty".to_string(),
            ));
        }
        if spec.id.contains(['[', ']']) {
            return Err(BundlerError::ConfigError(format!(
                "task id '{}' must not contain '[' or ']': that syntax names fan-out sub-tasks",
                spec.id
            )));
        }
        if !seen.insert(spec.id.as_str()) {
            return Err(BundlerError::ConfigError(format!(
                "duplicate task id '{}'",
                spec.id
            )));
        }
    }
    Ok(())
}

fn validate_demands(specs: &[TaskSpec]) -> Result<()> {
    for spec in specs {
        let mem = spec.demand.memory_gb;
        if !mem.is_finite() || mem < 0.0 {
            return Err(BundlerError::ConfigError(format!(
                "task '{}' has invalid memory_gb {}",
                spec.id, mem
            )));
        }
        if spec.demand.threads == 0 {
            return Err(BundlerError::ConfigError(format!(
                "task '{}' must request at least one thread",
                spec.id
            )));
        }
        if let Multiplicity::Fixed(0) = spec.multiplicity {
            return Err(BundlerError::ConfigError(format!(
                "task '{}' has multiplicity 0 (expected >= 1)",
                spec.id
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(specs: &[TaskSpec]) -> Result<()> {
    let ids: HashSet<&str> = specs.iter().map(|s| s.id.as_str()).collect();

    for spec in specs {
        for dep in spec.dependencies.iter() {
            if dep == &spec.id {
                return Err(BundlerError::ConfigError(format!(
                    "task '{}' cannot depend on itself",
                    spec.id
                )));
            }
            if !ids.contains(dep.as_str()) {
                return Err(BundlerError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}'",
                    spec.id, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(specs: &[TaskSpec]) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for spec in specs {
        graph.add_node(spec.id.as_str());
    }

    for spec in specs {
        for dep in spec.dependencies.iter() {
            graph.add_edge(dep.as_str(), spec.id.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(BundlerError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                node
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::body::TaskContext;
    use crate::types::ResourceDemand;

    fn task(id: &str, deps: &[&str]) -> TaskSpec {
        let mut spec = TaskSpec::from_fn(id, |_: &TaskContext| Ok(serde_json::Value::Null));
        spec.dependencies = deps.iter().map(|d| d.to_string()).collect();
        spec
    }

    #[test]
    fn unknown_dependency_is_config_error() {
        let err = validate_task_specs(&[task("a", &["ghost"])]).unwrap_err();
        match err {
            BundlerError::ConfigError(msg) => {
                assert!(msg.contains("unknown dependency"));
                assert!(msg.contains("ghost"));
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn subtask_style_ids_are_reserved() {
        let err = validate_task_specs(&[task("p", &[]), task("p[0]", &[])]).unwrap_err();
        match err {
            BundlerError::ConfigError(msg) => assert!(msg.contains("'p[0]'"), "{msg}"),
            other => panic!("expected ConfigError, got {other:?}"),
        }
        assert!(validate_task_specs(&[task("sub]", &[])]).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = validate_task_specs(&[task("a", &[]), task("a", &[])]).unwrap_err();
        assert!(matches!(err, BundlerError::ConfigError(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn zero_threads_are_rejected() {
        let mut spec = task("a", &[]);
        spec.demand = ResourceDemand::new(1.0, 0);
        assert!(validate_task_specs(&[spec]).is_err());
    }

    #[test]
    fn three_node_cycle_is_detected() {
        let err = validate_task_specs(&[task("a", &["c"]), task("b", &["a"]), task("c", &["b"])])
            .unwrap_err();
        assert!(matches!(err, BundlerError::DagCycle(msg) if msg.contains("cycle detected")));
    }

    #[test]
    fn explicit_limits_skip_host_detection() {
        let raw = RawSchedulerConfig {
            max_memory_gb: Some(8.0),
            max_threads: Some(4),
            ..RawSchedulerConfig::default()
        };
        let cfg = SchedulerConfig::try_from(raw).unwrap();
        assert_eq!(cfg.max_memory_gb, 8.0);
        assert_eq!(cfg.max_threads, 4);
        assert_eq!(cfg.worker_pool_size, 4);
    }

    #[test]
    fn zero_workers_is_config_error() {
        let raw = RawSchedulerConfig {
            max_memory_gb: Some(8.0),
            max_threads: Some(4),
            worker_pool_size: Some(0),
            ..RawSchedulerConfig::default()
        };
        assert!(SchedulerConfig::try_from(raw).is_err());
    }
}
