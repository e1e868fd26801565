//! Sandboxed project collaborators consumed by the action runner.
//!
//! The core crate only ever talks to the traits defined here (`ProjectFs`,
//! `CommandRunner`, `DatabaseExecutor`, the dev-server registry); the local
//! implementations in this crate back them with the host filesystem and a
//! bash subprocess. A hosted sandbox can swap in its own implementations
//! without touching the core.

pub mod database;
pub mod dev_server;
pub mod fs;

pub use database::{DatabaseExecutor, UnconfiguredDatabase};
pub use dev_server::{DevServerRegistry, ProcessInfo};
pub use fs::{LocalProjectFs, ProjectFs};

use anyhow::Result;
use std::path::Path;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// Trait for receiving streaming output from command execution
pub trait OutputReceiver: Send + Sync {
    /// Called when a new line of output is available
    fn on_output_line(&self, line: &str);
}

/// A receiver that discards all output.
pub struct NullOutputReceiver;

impl OutputReceiver for NullOutputReceiver {
    fn on_output_line(&self, _line: &str) {}
}

/// Trait for running shell commands inside the project sandbox.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, streaming output lines to `receiver`.
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        receiver: &dyn OutputReceiver,
    ) -> Result<ExecutionResult>;
}

/// Runs commands through `bash -c` on the host.
pub struct LocalCommandRunner;

impl LocalCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandRunner for LocalCommandRunner {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        receiver: &dyn OutputReceiver,
    ) -> Result<ExecutionResult> {
        use std::process::Stdio;
        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::process::Command as TokioCommand;

        debug!("Executing command: {} (cwd: {:?})", command, working_dir);

        let mut cmd = TokioCommand::new("bash");
        cmd.arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut stdout_output = Vec::new();
        let mut stderr_output = Vec::new();

        // Read output lines as they come
        loop {
            tokio::select! {
                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            receiver.on_output_line(&line);
                            stdout_output.push(line);
                        }
                        Ok(None) => break, // EOF
                        Err(e) => {
                            error!("Error reading stdout: {}", e);
                            break;
                        }
                    }
                }
                line = stderr_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            receiver.on_output_line(&line);
                            stderr_output.push(line);
                        }
                        Ok(None) => {}, // stderr EOF, continue
                        Err(e) => {
                            error!("Error reading stderr: {}", e);
                        }
                    }
                }
                else => break
            }
        }

        let status = child.wait().await?;

        let result = ExecutionResult {
            stdout: stdout_output.join("\n"),
            stderr: stderr_output.join("\n"),
            exit_code: status.code().unwrap_or(-1),
            success: status.success(),
        };

        debug!(
            "Command finished: exit_code={}, stdout {} bytes, stderr {} bytes",
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }
}
