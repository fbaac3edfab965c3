//! Configuration management for exec-session.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::CommandOptions;
use crate::session::{Session, DEFAULT_PING_CONCURRENCY};
use crate::transport::{RpcConfig, ScpTransfer, SshAuth, SshConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where commands run.
    pub target: TargetSection,
    /// Default options merged into every command.
    pub command: CommandOptions,
    /// Ping fan-out settings.
    pub ping: PingSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Transport kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Processes on this machine.
    #[default]
    Local,
    /// Remote host over SSH.
    Ssh,
    /// Remote-call agent.
    Rpc,
}

impl TargetKind {
    /// Lowercase name as used in config and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ssh => "ssh",
            Self::Rpc => "rpc",
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "ssh" => Ok(Self::Ssh),
            "rpc" => Ok(Self::Rpc),
            _ => Err(s.to_string()),
        }
    }
}

/// Target configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    /// Which transport to use.
    pub kind: TargetKind,
    /// SSH settings, required when `kind` is `ssh`. With `kind` set to
    /// `rpc` they are used for file pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshConfig>,
    /// Agent settings, required when `kind` is `rpc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc: Option<RpcConfig>,
}

/// Ping configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PingSection {
    /// Maximum hosts pinged at once.
    pub concurrency: usize,
}

impl Default for PingSection {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_PING_CONCURRENCY,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(kind) = std::env::var("EXEC_SESSION_TARGET") {
            if let Ok(kind) = kind.parse() {
                self.target.kind = kind;
            }
        }

        if let Ok(dir) = std::env::var("EXEC_SESSION_CWD") {
            if !dir.is_empty() {
                self.command.working_dir = Some(dir.into());
            }
        }

        if let Ok(secs) = std::env::var("EXEC_SESSION_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                self.command.timeout_secs = Some(secs);
            }
        }

        if let Ok(password) = std::env::var("EXEC_SESSION_SSH_PASSWORD") {
            if let Some(ssh) = self.target.ssh.as_mut() {
                ssh.auth = SshAuth::Password { password };
            }
        }

        if let Ok(token) = std::env::var("EXEC_SESSION_RPC_TOKEN") {
            if let Some(rpc) = self.target.rpc.as_mut() {
                rpc.token = Some(token);
            }
        }

        if let Ok(limit) = std::env::var("EXEC_SESSION_PING_CONCURRENCY") {
            if let Ok(limit) = limit.parse() {
                self.ping.concurrency = limit;
            }
        }

        if let Ok(level) = std::env::var("EXEC_SESSION_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(kind) = args.target {
            self.target.kind = kind;
        }

        if let Some(ref dir) = args.cwd {
            self.command.working_dir = Some(dir.clone());
        }

        if let Some(secs) = args.timeout_secs {
            self.command.timeout_secs = Some(secs);
        }

        if let Some(limit) = args.ping_concurrency {
            self.ping.concurrency = limit;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Build a session for the configured target.
    pub fn build_session(&self) -> Result<Session, ConfigError> {
        let defaults = self.command.clone();
        let session = match self.target.kind {
            TargetKind::Local => Session::local(defaults),
            TargetKind::Ssh => {
                let ssh = self
                    .target
                    .ssh
                    .clone()
                    .ok_or(ConfigError::MissingTarget(TargetKind::Ssh))?;
                Session::ssh(ssh, defaults)
            }
            TargetKind::Rpc => {
                let rpc = self
                    .target
                    .rpc
                    .clone()
                    .ok_or(ConfigError::MissingTarget(TargetKind::Rpc))?;
                let session = Session::rpc(rpc, defaults);
                match self.target.ssh.clone() {
                    Some(ssh) => session.with_transfer(ScpTransfer::with_connection(ssh)),
                    None => session,
                }
            }
        };

        Ok(session.with_ping_concurrency(self.ping.concurrency))
    }

    /// Fail early when the configured target has nowhere to push files to.
    pub fn check_push(&self) -> Result<(), ConfigError> {
        if self.target.kind == TargetKind::Rpc && self.target.ssh.is_none() {
            return Err(ConfigError::NoPushTarget);
        }
        Ok(())
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Target kind selected without its settings section.
    MissingTarget(TargetKind),
    /// Push requested on an rpc target without SSH settings.
    NoPushTarget,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::MissingTarget(kind) => {
                write!(f, "target kind '{}' needs a target.{} section", kind.as_str(), kind.as_str())
            }
            Self::NoPushTarget => write!(f, "push on an rpc target needs a target.ssh section"),
        }
    }
}

impl std::error::Error for ConfigError {}
