//! Recursive git clones with caller-supplied logging context.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info, Span};

use crate::error::SessionError;
use crate::execution::ExecutionResult;
use crate::Result;

/// Runs `git clone --recursive` on this machine.
///
/// Log records are attached to the span handed in at construction, so a
/// clone shows up under whatever deployment or request owns it.
#[derive(Debug, Clone)]
pub struct GitClient {
    program: String,
    span: Span,
    passthrough: bool,
}

impl GitClient {
    /// Clone with the `git` found on `PATH`, logging under `span`.
    pub fn new(span: Span) -> Self {
        Self {
            program: "git".to_string(),
            span,
            passthrough: false,
        }
    }

    /// Use another executable in place of `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Stream git's output to this process's stdout and stderr as it runs,
    /// instead of capturing it. Captured fields of the result stay empty.
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// The span clone records are logged under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// `git clone --recursive <repo_url> [target_dir]`
    ///
    /// A non-zero exit is logged on the injected span and returned as
    /// [`SessionError::CloneFailed`] carrying git's stderr.
    pub async fn clone_recursive(
        &self,
        repo_url: &str,
        target_dir: Option<&Path>,
    ) -> Result<ExecutionResult> {
        if repo_url.is_empty() {
            return Err(SessionError::MissingArgument("repo_url"));
        }

        info!(parent: &self.span, repo = %repo_url, "Cloning repository");

        let mut cmd = Command::new(&self.program);
        cmd.args(["clone", "--recursive", repo_url]);
        if let Some(dir) = target_dir {
            cmd.arg(dir);
        }

        let spawned = if self.passthrough {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            cmd.status().await.map(|status| (status, Vec::new(), Vec::new()))
        } else {
            cmd.output()
                .await
                .map(|output| (output.status, output.stdout, output.stderr))
        };

        let (status, stdout, stderr) = match spawned {
            Ok(parts) => parts,
            Err(e) => {
                error!(parent: &self.span, repo = %repo_url, error = %e, "Failed to start git");
                return Err(SessionError::CloneFailed(e.to_string()));
            }
        };

        let result = ExecutionResult {
            exit_code: status.code(),
            signal: None,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };

        if !status.success() {
            error!(
                parent: &self.span,
                repo = %repo_url,
                exit_code = ?result.exit_code,
                stderr = %result.stderr.trim(),
                "Git clone failed"
            );
            let reason = match result.stderr.trim() {
                "" => format!("git exited with {status}"),
                stderr => stderr.to_string(),
            };
            return Err(SessionError::CloneFailed(reason));
        }

        info!(parent: &self.span, repo = %repo_url, "Repository cloned");
        Ok(result)
    }
}
