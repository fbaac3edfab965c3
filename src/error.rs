//! Error types for exec-session.

use std::time::Duration;

use thiserror::Error;

/// Main error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A required positional argument was absent or empty.
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Service or supervisor action outside the allowed set.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A command spec finished with an exit code it does not allow.
    ///
    /// `None` means the process was terminated by a signal.
    #[error("invalid exit code: {}", exit_code_text(.0))]
    InvalidExitCode(Option<i32>),

    /// A version probe produced no matching output line.
    #[error("\"{0}\" not found")]
    CommandNotFound(String),

    /// A version probe exited non-zero.
    #[error("{stdout} {stderr}")]
    ProbeFailed { stdout: String, stderr: String },

    /// Ping target failed validation.
    #[error("invalid host: {0:?}")]
    InvalidHost(String),

    /// Recursive clone failed.
    #[error("clone failed: {0}")]
    CloneFailed(String),

    /// Error reported by the transport client, passed through untouched.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Error reported by the transfer collaborator, passed through untouched.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by a transport client before a command produced a result.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Process could not be spawned or the stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The command exceeded its timeout.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// SSH connection or channel failure.
    #[error("SSH error: {0}")]
    Ssh(String),

    /// SSH authentication was rejected.
    #[error("SSH authentication failed for {0}")]
    Authentication(String),

    /// Remote procedure call failure reported by the peer.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Malformed response from the peer.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Error raised while copying a file to the session target.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Local file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transfer metadata had no destination path.
    #[error("transfer destination path is missing")]
    MissingPath,

    /// Transfer metadata had no connection details.
    #[error("transfer connection details are missing")]
    MissingConnection,

    /// The SSH session used for the copy failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote end refused the copy.
    #[error("remote rejected transfer: {0}")]
    Rejected(String),
}

/// Convenience Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "null".to_string(),
    }
}
