//! Command lifecycle events.

use crate::execution::{CommandOptions, ExecutionResult};

/// Emitted by a session around every literal command it dispatches.
///
/// `Start` precedes the transport call; `Finish` follows a successful one.
/// A failed transport call emits nothing further.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// The command is about to be sent.
    Start {
        script: String,
        options: Option<CommandOptions>,
    },
    /// The transport returned a result.
    Finish {
        script: String,
        options: Option<CommandOptions>,
        result: ExecutionResult,
    },
}

impl CommandEvent {
    /// The command string this event concerns.
    pub fn script(&self) -> &str {
        match self {
            Self::Start { script, .. } | Self::Finish { script, .. } => script,
        }
    }

    /// `"start"` or `"finish"`.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Finish { .. } => "finish",
        }
    }
}
