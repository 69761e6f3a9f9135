//! External agent process execution.
//!
//! Agents run with the workspace as their working directory. The prompt is
//! written to `prompt.md` and the command line only points at it, so large
//! prompts never hit argument length limits.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::error::AgentError;

/// File the prompt is written to inside the workspace.
pub const PROMPT_FILE: &str = "prompt.md";

/// Instruction passed on the command line.
pub fn prompt_instruction() -> String {
    format!("Read the file {PROMPT_FILE} and follow all instructions in it.")
}

/// Captured output of a finished agent process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Write the prompt into the workspace and return its path.
pub async fn write_prompt(workspace: &Path, prompt: &str) -> std::io::Result<PathBuf> {
    let path = workspace.join(PROMPT_FILE);
    tokio::fs::write(&path, prompt).await?;
    Ok(path)
}

/// Run `program args...` inside `cwd`, bounded by `timeout`.
///
/// A missing executable is reported as [`AgentError::Spawn`]; a process that
/// outlives the timeout is killed and reported as [`AgentError::Timeout`].
/// A non-zero exit is not an error here, callers decide what it means.
pub async fn run(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, AgentError> {
    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AgentError::Spawn {
            program: program.to_owned(),
            reason: e.to_string(),
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| AgentError::Timeout {
            program: program.to_owned(),
            secs: timeout.as_secs(),
        })?
        .map_err(|e| AgentError::Spawn {
            program: program.to_owned(),
            reason: e.to_string(),
        })?;

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: start.elapsed(),
    })
}
