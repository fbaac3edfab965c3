//! The session: one transport, default options, and command dispatch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::commands::TarArgs;
use super::directive::{CommandSpec, Invocation, Script};
use super::event::CommandEvent;
use crate::error::SessionError;
use crate::execution::{CommandOptions, ExecutionResult};
use crate::transport::{
    LocalCopyTransfer, LocalTransport, RpcConfig, RpcTransport, ScpTransfer, SshConfig,
    SshTransport, Transfer, TransferMeta, Transport,
};
use crate::Result;

/// Maximum number of hosts pinged at once by [`Session::ping_all`].
pub const DEFAULT_PING_CONCURRENCY: usize = 5;

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// Runs commands against one target through one transport.
///
/// The transport and default options are fixed at construction. All methods
/// take `&self`, so a session can serve concurrent calls; ordering between
/// their completions is up to the transport.
pub struct Session {
    client: Arc<dyn Transport>,
    transfer: Arc<dyn Transfer>,
    cmd_opts: CommandOptions,
    pub(super) ping_concurrency: usize,
    events: broadcast::Sender<CommandEvent>,
}

impl Session {
    /// Create a session over `client`, merging `cmd_opts` into every command.
    ///
    /// File pushes default to scp with connection details taken from the
    /// push metadata.
    pub fn new(client: impl Transport + 'static, cmd_opts: CommandOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client: Arc::new(client),
            transfer: Arc::new(ScpTransfer::new()),
            cmd_opts,
            ping_concurrency: DEFAULT_PING_CONCURRENCY,
            events,
        }
    }

    /// Session running commands on this machine.
    pub fn local(cmd_opts: CommandOptions) -> Self {
        Self::new(LocalTransport::new(), cmd_opts).with_transfer(LocalCopyTransfer)
    }

    /// Session running commands on a remote host over SSH.
    pub fn ssh(config: SshConfig, cmd_opts: CommandOptions) -> Self {
        let transfer = ScpTransfer::with_connection(config.clone());
        Self::new(SshTransport::new(config), cmd_opts).with_transfer(transfer)
    }

    /// Session running commands through a remote-call agent.
    pub fn rpc(config: RpcConfig, cmd_opts: CommandOptions) -> Self {
        Self::new(RpcTransport::new(config), cmd_opts)
    }

    /// Replace the transfer used by [`push`](Self::push).
    pub fn with_transfer(mut self, transfer: impl Transfer + 'static) -> Self {
        self.transfer = Arc::new(transfer);
        self
    }

    /// Bound the number of concurrent pings in [`ping_all`](Self::ping_all).
    pub fn with_ping_concurrency(mut self, limit: usize) -> Self {
        self.ping_concurrency = limit.max(1);
        self
    }

    /// Default options merged into every command.
    pub fn cmd_opts(&self) -> &CommandOptions {
        &self.cmd_opts
    }

    /// Receive [`CommandEvent`]s for commands dispatched from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe()
    }

    /// Run a literal command or a directive.
    ///
    /// Directives are dispatched to the named operation with `options` as its
    /// per-call options, and fail with [`SessionError::InvalidExitCode`] when
    /// the result's exit code is outside the directive's allowed set. A
    /// signal-terminated run has no exit code and never satisfies a set.
    pub async fn run_command(
        &self,
        script: impl Into<Script>,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        match script.into() {
            Script::Literal(script) => self.run_script(&script, options).await,
            Script::Directive(spec) => self.run_spec(&spec, options).await,
        }
    }

    /// Run a directive and enforce its exit-code policy.
    pub async fn run_spec(
        &self,
        spec: &CommandSpec,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let result = self.invoke(&spec.invocation, options).await?;
        if !spec.allows(result.exit_code) {
            return Err(SessionError::InvalidExitCode(result.exit_code));
        }
        Ok(result)
    }

    /// Send a literal command through the transport.
    ///
    /// Transport errors are returned untouched.
    pub async fn run_script(
        &self,
        script: &str,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let options = CommandOptions::resolve(&self.cmd_opts, options);

        self.emit(|| CommandEvent::Start {
            script: script.to_string(),
            options: options.clone(),
        });
        debug!(command = %script, has_options = options.is_some(), "Dispatching command");

        let result = self.client.send(script, options.as_ref()).await?;

        self.emit(|| CommandEvent::Finish {
            script: script.to_string(),
            options: options.clone(),
            result: result.clone(),
        });

        Ok(result)
    }

    async fn invoke(
        &self,
        invocation: &Invocation,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        match invocation {
            Invocation::Run { script } => self.run_script(script, opts).await,
            Invocation::Pwd { flags } => self.pwd(flags.as_deref(), opts).await,
            Invocation::Symlink { src, dest, flags } => {
                self.symlink(src, dest, flags.as_deref(), opts).await
            }
            Invocation::Readlink { target, flags } => {
                self.readlink(target, flags.as_deref(), opts).await
            }
            Invocation::Rm { filename, flags } => self.rm(filename, flags.as_deref(), opts).await,
            Invocation::Ls { filename, flags } => {
                self.ls(filename.as_deref(), flags.as_deref(), opts).await
            }
            Invocation::Cat { filename, flags } => self.cat(filename, flags.as_deref(), opts).await,
            Invocation::Mkdir { dirname, flags } => {
                self.mkdir(dirname, flags.as_deref(), opts).await
            }
            Invocation::Chown {
                filename,
                owner,
                group,
                flags,
            } => {
                self.chown(filename, owner, group, flags.as_deref(), opts)
                    .await
            }
            Invocation::Chmod {
                filename,
                perms,
                flags,
            } => self.chmod(filename, perms, flags.as_deref(), opts).await,
            Invocation::Rename { from, to, flags } => {
                self.rename(from, to, flags.as_deref(), opts).await
            }
            Invocation::Extract {
                filename,
                output_dir,
                args,
                post_args,
            } => {
                let tar = (args.is_some() || post_args.is_some()).then(|| TarArgs {
                    args: args.clone(),
                    post_args: post_args.clone(),
                });
                self.extract(filename, output_dir, tar.as_ref(), opts).await
            }
            Invocation::Wget {
                url,
                output_file,
                flags,
            } => self.wget(url, output_file, flags.as_deref(), opts).await,
            Invocation::Service { name, action } => self.service(name, action, opts).await,
            Invocation::Supervisorctl { name, action } => {
                self.supervisorctl(name, action, opts).await
            }
            Invocation::Ping { host, flags } => {
                let host = host.parse()?;
                self.ping(&host, flags.as_deref(), opts).await
            }
        }
    }

    /// Whether `filename` exists, judged by `ls` exiting 0.
    ///
    /// Never fails: any error counts as "does not exist".
    pub async fn exists(
        &self,
        filename: &str,
        ls_flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> bool {
        match self.ls(Some(filename), ls_flags, opts).await {
            Ok(result) => result.exit_code == Some(0),
            Err(e) => {
                debug!(filename = %filename, error = %e, "Existence check failed");
                false
            }
        }
    }

    /// Copy `local_path` to `remote_dest` on the session's target.
    ///
    /// Uses the session's transfer, not the command transport. `meta` is not
    /// modified; the destination is merged into a copy.
    pub async fn push(&self, meta: &TransferMeta, local_path: &Path, remote_dest: &str) -> Result<()> {
        if remote_dest.is_empty() {
            return Err(SessionError::MissingArgument("remote_dest"));
        }
        let meta = meta.with_path(remote_dest);
        self.transfer.transfer(local_path, &meta).await?;
        Ok(())
    }

    /// Substitute `<key>` placeholders; see [`replace_cmd_args`](super::replace_cmd_args).
    pub fn replace_cmd_args(cmd: &Script, replacements: &HashMap<String, String>) -> Script {
        super::directive::replace_cmd_args(cmd, replacements)
    }

    fn emit(&self, event: impl FnOnce() -> CommandEvent) {
        if self.events.receiver_count() > 0 {
            // no receivers left is not an error
            let _ = self.events.send(event());
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cmd_opts", &self.cmd_opts)
            .field("ping_concurrency", &self.ping_concurrency)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
