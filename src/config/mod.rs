// src/config/mod.rs

//! Configuration: scheduler limits and pipeline files.
//!
//! - [`model`] mirrors the TOML layout (`RawPipelineFile`).
//! - [`scheduler`] holds the validated `SchedulerConfig` and host detection.
//! - [`pipeline`] turns `[task.<id>]` sections into task specs.
//! - [`validate`] checks scheduler limits and task lists.
//! - [`loader`] reads files from disk.

pub mod loader;
pub mod model;
pub mod pipeline;
pub mod scheduler;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{RawPipelineFile, RawSchedulerConfig, TaskConfig};
pub use pipeline::Pipeline;
pub use scheduler::SchedulerConfig;
