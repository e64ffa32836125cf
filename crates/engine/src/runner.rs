//! Subprocess execution.
//!
//! Every stage reaches external tools through [`ProcessRunner`], so the
//! lifecycle can be exercised without git or a Go toolchain installed.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Result of command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();

        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (_, true) => stdout.to_string(),
            _ => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Runs a program with arguments in a working directory.
///
/// A non-zero exit is reported through [`CommandOutput::exit_code`], not as an
/// error. Errors mean the process could not run at all: `NotFound` for a
/// missing program, `TimedOut` when the configured timeout elapsed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], working_dir: &Path)
    -> io::Result<CommandOutput>;
}

/// Runs real subprocesses with tokio.
pub struct CommandRunner {
    /// Extra environment variables for every command.
    env: HashMap<String, String>,

    /// Per-command timeout.
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Creates a runner that never prompts for git credentials.
    pub fn new() -> Self {
        let mut env = HashMap::new();
        env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());

        Self { env, timeout: None }
    }

    /// Sets the per-command timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve_program(program: &str) -> io::Result<PathBuf> {
        which::which(program).map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("'{}' not found: {}", program, e),
            )
        })
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: &Path,
    ) -> io::Result<CommandOutput> {
        let resolved = Self::resolve_program(program)?;
        debug!(program, ?args, dir = %working_dir.display(), "running command");

        // Killed if the caller drops this future, e.g. on interrupt.
        let child = TokioCommand::new(resolved)
            .args(args)
            .current_dir(working_dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("'{}' timed out after {}s", program, limit.as_secs()),
                    )
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
