// src/memo/mod.rs

//! Memoization: skip tasks whose fingerprint already has a completion
//! record.
//!
//! - [`fingerprint`] derives fingerprints from commands and input files.
//! - [`store`] holds the `MemoStore` trait and its memory/file backends.

pub mod fingerprint;
pub mod store;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::dag::spec::TaskSpec;
use crate::exec::body::TaskValue;
use crate::types::{Overwrite, TaskFlags};

pub use fingerprint::{compute_file_hash, compute_fingerprint};
pub use store::{FileMemoStore, InMemoryMemoStore, MemoRecord, MemoStore};

/// Outcome of consulting the cache for one task.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoLookup {
    /// The task must not use the cache (no fingerprint, forced rerun, or
    /// lookups disabled).
    Bypass,
    Miss,
    Hit(MemoRecord),
}

/// Whether a task with these flags may reuse a cached completion.
///
/// `Force` never does; `Never` always does; `Default` does unless the task
/// is `always_run`.
pub fn may_use_cache(flags: &TaskFlags) -> bool {
    match flags.overwrite {
        Overwrite::Force => false,
        Overwrite::Never => true,
        Overwrite::Default => !flags.always_run,
    }
}

/// Cheap-to-clone handle on a memo store plus the run's lookup policy.
#[derive(Clone)]
pub struct MemoCache {
    store: Arc<dyn MemoStore>,
    lookups_enabled: bool,
}

impl MemoCache {
    pub fn new(store: Arc<dyn MemoStore>) -> Self {
        Self {
            store,
            lookups_enabled: true,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryMemoStore::new()))
    }

    /// A cache that is never consulted (records are still written).
    pub fn disabled() -> Self {
        Self::in_memory().with_lookups(false)
    }

    pub fn with_lookups(mut self, enabled: bool) -> Self {
        self.lookups_enabled = enabled;
        self
    }

    pub fn lookups_enabled(&self) -> bool {
        self.lookups_enabled
    }

    pub fn store(&self) -> &Arc<dyn MemoStore> {
        &self.store
    }

    /// `lookup(fingerprint) -> hit | miss`, honouring the task's flags.
    pub fn lookup(&self, spec: &TaskSpec) -> Result<MemoLookup> {
        let Some(fingerprint) = spec.fingerprint.as_deref() else {
            return Ok(MemoLookup::Bypass);
        };

        if !self.lookups_enabled || !may_use_cache(&spec.flags) {
            return Ok(MemoLookup::Bypass);
        }

        match self.store.lookup(fingerprint)? {
            Some(record) => {
                debug!(task = %spec.id, fingerprint = %fingerprint, "memo hit");
                Ok(MemoLookup::Hit(record))
            }
            None => {
                debug!(task = %spec.id, fingerprint = %fingerprint, "memo miss");
                Ok(MemoLookup::Miss)
            }
        }
    }

    /// Remember an executed completion. Tasks without a fingerprint are
    /// never recorded.
    pub fn record(&self, spec: &TaskSpec, result: &TaskValue) -> Result<()> {
        let Some(fingerprint) = spec.fingerprint.as_deref() else {
            return Ok(());
        };

        self.store.record(
            fingerprint,
            MemoRecord {
                task: spec.id.clone(),
                result: result.clone(),
            },
        )
    }
}

impl fmt::Debug for MemoCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache")
            .field("lookups_enabled", &self.lookups_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::body::TaskContext;
    use serde_json::json;

    fn spec(fingerprint: Option<&str>, flags: TaskFlags) -> TaskSpec {
        let mut spec = TaskSpec::from_fn("t", |_: &TaskContext| Ok(json!(null)));
        spec.fingerprint = fingerprint.map(str::to_string);
        spec.flags = flags;
        spec
    }

    #[test]
    fn overwrite_policy_table() {
        let plain = TaskFlags::default();
        let always = TaskFlags {
            always_run: true,
            ..TaskFlags::default()
        };

        assert!(may_use_cache(&plain));
        assert!(!may_use_cache(&always));
        assert!(!may_use_cache(&TaskFlags {
            overwrite: Overwrite::Force,
            ..plain
        }));
        assert!(may_use_cache(&TaskFlags {
            overwrite: Overwrite::Never,
            ..always
        }));
    }

    #[test]
    fn fingerprint_absent_always_bypasses() {
        let cache = MemoCache::in_memory();
        let s = spec(None, TaskFlags::default());
        cache.record(&s, &json!(1)).unwrap();
        assert_eq!(cache.lookup(&s).unwrap(), MemoLookup::Bypass);
        assert_eq!(cache.store().len().unwrap(), 0);
    }

    #[test]
    fn hit_after_record() {
        let cache = MemoCache::in_memory();
        let s = spec(Some("fp"), TaskFlags::default());

        assert_eq!(cache.lookup(&s).unwrap(), MemoLookup::Miss);
        cache.record(&s, &json!({"k": 1})).unwrap();

        match cache.lookup(&s).unwrap() {
            MemoLookup::Hit(record) => assert_eq!(record.result, json!({"k": 1})),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn disabled_cache_bypasses_but_records() {
        let cache = MemoCache::disabled();
        let s = spec(Some("fp"), TaskFlags::default());
        cache.record(&s, &json!(1)).unwrap();

        assert_eq!(cache.lookup(&s).unwrap(), MemoLookup::Bypass);
        assert_eq!(cache.store().len().unwrap(), 1);
    }
}
