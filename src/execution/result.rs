//! Execution result types.

use serde::{Deserialize, Serialize};

/// Result of a command that ran to completion on its target.
///
/// `exit_code` is `None` only when the process was terminated by a signal
/// before reporting a code; `signal` then names it where the transport can
/// tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit code (if the process reported one).
    pub exit_code: Option<i32>,
    /// Terminating signal name, e.g. `SIGKILL`.
    pub signal: Option<String>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecutionResult {
    /// Create a result for a process that exited with `code`.
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            signal: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a result for a process killed by `signal`.
    pub fn signaled(signal: impl Into<String>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            signal: Some(signal.into()),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Check if command failed (non-zero exit code or killed by signal).
    pub fn failed(&self) -> bool {
        self.signal.is_some() || matches!(self.exit_code, Some(c) if c != 0)
    }

    /// Stdout followed by stderr, newline separated.
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Get stdout, trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}
