// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `bundler`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bundler",
    version,
    about = "Run a pipeline of tasks as a DAG within memory and thread limits.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Bundler.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BUNDLER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[scheduler].max_memory_gb`.
    #[arg(long, value_name = "GB")]
    pub max_memory_gb: Option<f64>,

    /// Override `[scheduler].max_threads`.
    #[arg(long, value_name = "N")]
    pub max_threads: Option<u32>,

    /// Override `[scheduler].worker_pool_size`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Forbid task bodies from starting nested work. Shell command tasks
    /// will fail.
    #[arg(long)]
    pub no_nested: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = CliArgs::parse_from([
            "bundler",
            "--config",
            "p.toml",
            "--max-memory-gb",
            "12.5",
            "--workers",
            "3",
            "--no-nested",
        ]);
        assert_eq!(args.config, "p.toml");
        assert_eq!(args.max_memory_gb, Some(12.5));
        assert_eq!(args.workers, Some(3));
        assert!(args.no_nested);
        assert!(args.max_threads.is_none());
    }
}
