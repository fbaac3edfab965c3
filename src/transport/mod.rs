//! Transport clients.
//!
//! A transport runs one command string against its target and reports an
//! [`ExecutionResult`]. A process that exits, even non-zero, is a result;
//! only failures before exit (spawn errors, lost connections, timeouts) are
//! errors. Each adapter here opens a fresh process or connection per command,
//! so concurrent `send` calls never share a stream.

mod local;
mod rpc;
mod ssh;
mod transfer;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::execution::{CommandOptions, ExecutionResult};

pub use local::LocalTransport;
pub use rpc::{RpcConfig, RpcRequest, RpcResponse, RpcTransport};
pub use ssh::{HostKeyVerification, SshAuth, SshConfig, SshTransport};
pub use transfer::{LocalCopyTransfer, ScpTransfer, Transfer, TransferMeta};

/// Executes a single command against a local or remote target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `command`, honouring whichever `options` this transport understands.
    async fn send(
        &self,
        command: &str,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult, TransportError>;
}

/// Prefix a shell command with the working directory and environment from
/// `options`, for transports that can only ship a single command string.
pub(crate) fn shell_prelude(command: &str, options: Option<&CommandOptions>) -> String {
    let Some(options) = options else {
        return command.to_string();
    };

    let mut script = String::new();
    if let Some(dir) = &options.working_dir {
        script.push_str("cd ");
        script.push_str(&quote(&dir.to_string_lossy()));
        script.push_str(" && ");
    }
    for (key, value) in &options.env {
        script.push_str("export ");
        script.push_str(key);
        script.push('=');
        script.push_str(&quote(value));
        script.push_str("; ");
    }
    script.push_str(command);
    script
}

fn quote(value: &str) -> String {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| format!("'{}'", value.replace('\0', "").replace('\'', r"'\''")))
}
