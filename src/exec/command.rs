// src/exec/command.rs

//! Shell command task bodies.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::exec::body::{TaskBody, TaskContext, TaskValue};

/// Environment variables handed to every command.
pub const ENV_TASK_ID: &str = "BUNDLER_TASK_ID";
pub const ENV_NUM_THREADS: &str = "BUNDLER_NUM_THREADS";
pub const ENV_FANOUT_INDEX: &str = "BUNDLER_FANOUT_INDEX";
pub const ENV_INPUTS: &str = "BUNDLER_INPUTS";

/// Runs `cmd` through the platform shell.
///
/// - stdout is parsed as JSON when possible, otherwise kept as a string
///   (trailing whitespace trimmed; empty output becomes `null`)
/// - stderr is logged at debug level
/// - a non-zero exit is a task error
///
/// Starting a child process is nested work, so the run must allow nested
/// parallelism.
#[derive(Debug, Clone)]
pub struct CommandBody {
    cmd: String,
}

impl CommandBody {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        }
    }
}

impl TaskBody for CommandBody {
    fn run(&self, ctx: &TaskContext) -> Result<TaskValue> {
        ctx.ensure_nested_allowed()?;

        let inputs: BTreeMap<&str, &TaskValue> = ctx
            .inputs
            .iter()
            .map(|input| (input.task.as_str(), &input.value))
            .collect();
        let inputs = serde_json::to_string(&inputs).context("serializing task inputs")?;

        let mut cmd = self.shell();
        cmd.env(ENV_TASK_ID, &ctx.task)
            .env(ENV_NUM_THREADS, ctx.threads.to_string())
            .env(ENV_INPUTS, inputs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(index) = ctx.fanout_index {
            cmd.env(ENV_FANOUT_INDEX, index.to_string());
        }

        info!(task = %ctx.task, cmd = %self.cmd, "spawning task process");
        let output = cmd
            .output()
            .with_context(|| format!("spawning process for task '{}'", ctx.task))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(task = %ctx.task, "stderr: {}", line);
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let last = stderr.lines().last().unwrap_or_default();
            bail!("command `{}` exited with code {code}: {last}", self.cmd);
        }

        Ok(parse_stdout(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_stdout(stdout: &str) -> TaskValue {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return TaskValue::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| TaskValue::String(trimmed.to_string()))
}
