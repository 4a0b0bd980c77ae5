// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RawPipelineFile;
use crate::config::pipeline::Pipeline;
use crate::errors::Result;

/// Load a pipeline file from a given path and return the raw `RawPipelineFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawPipelineFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load a pipeline file and validate it.
///
/// - Reads TOML.
/// - Applies scheduler defaults from the host.
/// - Checks for unknown/duplicate ids, invalid demands and cycles.
/// - Fingerprints tasks relative to the file's directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Pipeline> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    Pipeline::from_raw(raw, &config_root_dir(path))
}

/// Directory relative paths in a pipeline file are resolved against.
///
/// A bare file name (parent = "") resolves against the working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Bundler.toml")
}
