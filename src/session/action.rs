//! Service control actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Action accepted by `service` and `supervisorctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Stop,
    Start,
    Reload,
    Restart,
    Status,
}

impl ServiceAction {
    /// The action as passed on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Reload => "reload",
            Self::Restart => "restart",
            Self::Status => "status",
        }
    }
}

impl FromStr for ServiceAction {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "start" => Ok(Self::Start),
            "reload" => Ok(Self::Reload),
            "restart" => Ok(Self::Restart),
            "status" => Ok(Self::Status),
            other => Err(SessionError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
