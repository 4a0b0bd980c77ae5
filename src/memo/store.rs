// src/memo/store.rs

//! Storage backends for memoized completion records.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::exec::body::TaskValue;
use crate::types::TaskId;

/// Relative path (from the pipeline root) of the file-backed memo store.
pub const MEMO_FILE_PATH: &str = ".bundler/memo.json";

/// What is remembered about a completed, fingerprinted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoRecord {
    pub task: TaskId,
    pub result: TaskValue,
}

/// Abstract storage for fingerprint -> completion record.
///
/// Reads may happen from any thread; writes are only issued by the
/// coordinator.
pub trait MemoStore: Send + Sync {
    fn lookup(&self, fingerprint: &str) -> Result<Option<MemoRecord>>;
    fn record(&self, fingerprint: &str, record: MemoRecord) -> Result<()>;
    fn len(&self) -> Result<usize>;
}

/// Keeps records in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct InMemoryMemoStore {
    records: RwLock<HashMap<String, MemoRecord>>,
}

impl InMemoryMemoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoStore for InMemoryMemoStore {
    fn lookup(&self, fingerprint: &str) -> Result<Option<MemoRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("memo store lock poisoned"))?;
        Ok(records.get(fingerprint).cloned())
    }

    fn record(&self, fingerprint: &str, record: MemoRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("memo store lock poisoned"))?;
        debug!(task = %record.task, fingerprint = %fingerprint, "stored memo record (memory)");
        records.insert(fingerprint.to_string(), record);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("memo store lock poisoned"))?;
        Ok(records.len())
    }
}

/// Stores records in a JSON file, re-read on every access so that several
/// runs (or processes) observe each other's completions.
#[derive(Debug)]
pub struct FileMemoStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: RwLock<()>,
}

impl FileMemoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Store at `<root>/.bundler/memo.json`.
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(MEMO_FILE_PATH))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> Result<HashMap<String, MemoRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading memo file {:?}", self.path))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("parsing memo file {:?}", self.path))
    }

    fn save_all(&self, records: &HashMap<String, MemoRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating memo dir {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("writing memo file {:?}", self.path))
    }
}

impl MemoStore for FileMemoStore {
    fn lookup(&self, fingerprint: &str) -> Result<Option<MemoRecord>> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| anyhow!("memo store lock poisoned"))?;
        Ok(self.load_all()?.remove(fingerprint))
    }

    fn record(&self, fingerprint: &str, record: MemoRecord) -> Result<()> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| anyhow!("memo store lock poisoned"))?;
        let mut all = self.load_all()?;
        info!(task = %record.task, fingerprint = %fingerprint, "stored memo record (file)");
        all.insert(fingerprint.to_string(), record);
        self.save_all(&all)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }
}
