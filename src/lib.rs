//! # exec-session
//!
//! Run shell commands against a target through a pluggable transport.
//!
//! A [`Session`] wraps one [`Transport`] (local shell, SSH, or a remote-call
//! agent) together with default [`CommandOptions`], and offers a small
//! command vocabulary on top: file operations, service control, runtime
//! version probes, bounded ping fan-out and file pushes. Commands can also
//! be expressed as data with [`CommandSpec`], including the exit codes they
//! are allowed to finish with.
//!
//! ## Quick Start
//!
//! ```no_run
//! use exec_session::{CommandOptions, Session};
//!
//! #[tokio::main]
//! async fn main() -> exec_session::Result<()> {
//!     exec_session::logging::try_init().ok();
//!
//!     let session = Session::local(CommandOptions::new().working_dir("/tmp"));
//!     session.mkdir("build/out", None, None).await?;
//!
//!     if session.exists("build/out", None, None).await {
//!         let listing = session.ls(Some("build"), Some("la"), None).await?;
//!         println!("{}", listing.stdout);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod git;
pub mod logging;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, SessionError, TransferError, TransportError};
pub use execution::{CommandOptions, ExecutionResult};
pub use git::GitClient;
pub use session::{
    replace_cmd_args, CommandEvent, CommandSpec, Host, Invocation, Script, ServiceAction, Session,
    TarArgs,
};
pub use transport::{
    LocalCopyTransfer, LocalTransport, RpcConfig, RpcTransport, ScpTransfer, SshConfig,
    SshTransport, Transfer, TransferMeta, Transport,
};
