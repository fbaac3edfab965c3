//! Local subprocess transport.

use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::Transport;
use crate::error::TransportError;
use crate::execution::{CommandOptions, ExecutionResult};

/// Runs commands through the platform shell on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    shell: Option<String>,
}

impl LocalTransport {
    /// Create a transport using the default shell (`sh`, or `cmd` on Windows).
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell binary. It must accept `-c <script>`
    /// (`/C <script>` on Windows).
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: Some(shell.into()),
        }
    }

    #[cfg(unix)]
    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(self.shell.as_deref().unwrap_or("sh"));
        cmd.arg("-c").arg(script);
        cmd
    }

    #[cfg(windows)]
    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(self.shell.as_deref().unwrap_or("cmd"));
        cmd.arg("/C").arg(script);
        cmd
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(
        &self,
        command: &str,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult, TransportError> {
        let mut cmd = self.command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(options) = options {
            if let Some(dir) = &options.working_dir {
                cmd.current_dir(dir);
            }
            cmd.envs(&options.env);
        }

        debug!(command = %command, "Spawning local process");
        let child = cmd.spawn()?;
        let output = match options.and_then(CommandOptions::timeout_duration) {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(command = %command, ?limit, "Local command timed out");
                    return Err(TransportError::Timeout(limit));
                }
            },
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        Ok(ExecutionResult {
            exit_code: output.status.code(),
            signal: signal_name(&output.status),
            stdout,
            stderr,
        })
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let signal = status.signal()?;
    let name = match signal {
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGABRT => "SIGABRT",
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGPIPE => "SIGPIPE",
        libc::SIGALRM => "SIGALRM",
        libc::SIGTERM => "SIGTERM",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGUSR2 => "SIGUSR2",
        other => return Some(format!("SIG{other}")),
    };
    Some(name.to_string())
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}
