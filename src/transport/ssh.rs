//! Remote shell transport over SSH.
//!
//! Every command opens its own connection, authenticates, runs on a single
//! session channel and disconnects. Nothing is multiplexed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect, Sig};
use russh_keys::key::PublicKey;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::{shell_prelude, Transport};
use crate::error::TransportError;
use crate::execution::{CommandOptions, ExecutionResult};

/// Host key verification policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Only accept hosts listed in `known_hosts`.
    Strict,
    /// Accept unknown hosts, reject mismatching fingerprints.
    #[default]
    Accept,
    /// Accept everything. Development only.
    Disabled,
}

impl std::str::FromStr for HostKeyVerification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "accept" => Ok(Self::Accept),
            "disabled" | "none" | "false" => Ok(Self::Disabled),
            _ => Err(format!("unknown host key verification mode: {s}")),
        }
    }
}

/// SSH authentication method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SshAuth {
    /// Password authentication.
    Password { password: String },
    /// Private key file, optionally encrypted.
    Key {
        key_path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

/// SSH connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Host name or address.
    pub host: String,
    /// Port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Authentication method.
    pub auth: SshAuth,
    /// TCP connect + handshake timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Command timeout in seconds when the call sets none.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Host key verification policy.
    #[serde(default)]
    pub host_key_verification: HostKeyVerification,
    /// Known fingerprints keyed by `host:port`.
    #[serde(default)]
    pub known_hosts: HashMap<String, String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    300
}

impl SshConfig {
    /// Create a config with default port and timeouts.
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            auth,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts: HashMap::new(),
        }
    }

    /// Create a config using password authentication.
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(
            host,
            username,
            SshAuth::Password {
                password: password.into(),
            },
        )
    }

    /// Create a config using a private key file.
    pub fn with_key(
        host: impl Into<String>,
        username: impl Into<String>,
        key_path: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        Self::new(
            host,
            username,
            SshAuth::Key {
                key_path: key_path.into(),
                passphrase,
            },
        )
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the host key verification policy.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Record a known host fingerprint for this host.
    pub fn known_host(mut self, fingerprint: impl Into<String>) -> Self {
        self.known_hosts.insert(self.host_key(), fingerprint.into());
        self
    }

    fn host_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Executes commands on a remote host over SSH.
#[derive(Debug, Clone)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    /// Create a transport for the given host.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Get the connection settings.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn send(
        &self,
        command: &str,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult, TransportError> {
        let start = std::time::Instant::now();
        let script = shell_prelude(command, options);
        let limit = options
            .and_then(CommandOptions::timeout_duration)
            .unwrap_or(Duration::from_secs(self.config.command_timeout_secs));

        debug!(
            host = %self.config.host,
            port = self.config.port,
            user = %self.config.username,
            command = %command,
            "Executing SSH command"
        );

        let handle = connect(&self.config).await?;

        let mut channel = handle.channel_open_session().await.map_err(|e| {
            error!(error = %e, "Failed to open SSH channel");
            TransportError::Ssh(format!("failed to open channel: {e}"))
        })?;

        channel.exec(true, script.as_str()).await.map_err(|e| {
            error!(error = %e, "Failed to start SSH command");
            TransportError::Ssh(format!("failed to exec: {e}"))
        })?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut signal = None;

        let drained = timeout(limit, async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    // SSH_EXTENDED_DATA_STDERR
                    ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                        stderr.extend_from_slice(data)
                    }
                    ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
                    ChannelMsg::ExitSignal { signal_name, .. } => signal = Some(sig_name(&signal_name)),
                    _ => {}
                }
            }
        })
        .await;

        let _ = channel.close().await;
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;

        if drained.is_err() {
            warn!(host = %self.config.host, ?limit, "SSH command timed out");
            return Err(TransportError::Timeout(limit));
        }

        info!(
            host = %self.config.host,
            exit_code = ?exit_code,
            duration_secs = start.elapsed().as_secs_f64(),
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "SSH command finished"
        );

        Ok(ExecutionResult {
            exit_code,
            signal,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

/// Connect and authenticate, returning a ready client handle.
pub(crate) async fn connect(config: &SshConfig) -> Result<Handle<HostKeyCheck>, TransportError> {
    let client_config = Arc::new(client::Config::default());
    let handler = HostKeyCheck {
        verification: config.host_key_verification.clone(),
        expected: config.known_hosts.get(&config.host_key()).cloned(),
        host_key: config.host_key(),
    };

    let mut handle = timeout(
        Duration::from_secs(config.connect_timeout_secs),
        client::connect(client_config, (config.host.clone(), config.port), handler),
    )
    .await
    .map_err(|_| {
        TransportError::Ssh(format!(
            "connection to {}@{}:{} timed out",
            config.username, config.host, config.port
        ))
    })?
    .map_err(|e| {
        error!(error = %e, host = %config.host, "SSH connection failed");
        TransportError::Ssh(format!("connection to {} failed: {e}", config.host_key()))
    })?;

    let authenticated = match &config.auth {
        SshAuth::Password { password } => handle
            .authenticate_password(config.username.clone(), password.clone())
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?,
        SshAuth::Key {
            key_path,
            passphrase,
        } => {
            let key = russh_keys::load_secret_key(key_path, passphrase.as_deref()).map_err(|e| {
                error!(error = %e, path = %key_path.display(), "Failed to load SSH key");
                TransportError::Ssh(format!("failed to load key {}: {e}", key_path.display()))
            })?;
            handle
                .authenticate_publickey(config.username.clone(), Arc::new(key))
                .await
                .map_err(|e| TransportError::Ssh(e.to_string()))?
        }
    };

    if !authenticated {
        error!(host = %config.host, user = %config.username, "SSH authentication rejected");
        return Err(TransportError::Authentication(format!(
            "{}@{}",
            config.username, config.host
        )));
    }

    Ok(handle)
}

fn sig_name(sig: &Sig) -> String {
    match sig {
        Sig::Custom(name) => name.clone(),
        other => format!("SIG{other:?}"),
    }
}

/// Host key policy applied during the handshake.
pub(crate) struct HostKeyCheck {
    verification: HostKeyVerification,
    expected: Option<String>,
    host_key: String,
}

impl HostKeyCheck {
    fn verify(&self, fingerprint: &str) -> bool {
        match (&self.verification, &self.expected) {
            (HostKeyVerification::Disabled, _) => {
                warn!(host = %self.host_key, "Host key verification disabled");
                true
            }
            (_, Some(expected)) if expected == fingerprint => {
                debug!(host = %self.host_key, "Host key verified");
                true
            }
            (_, Some(expected)) => {
                error!(
                    host = %self.host_key,
                    expected = %expected,
                    actual = %fingerprint,
                    "Host key mismatch, rejecting connection"
                );
                false
            }
            (HostKeyVerification::Accept, None) => {
                info!(host = %self.host_key, fingerprint = %fingerprint, "Accepting unknown host key");
                true
            }
            (HostKeyVerification::Strict, None) => {
                error!(host = %self.host_key, "Unknown host in strict mode, rejecting connection");
                false
            }
        }
    }
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(self.verify(&server_public_key.fingerprint()))
    }
}
