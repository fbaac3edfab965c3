//! Remote-call transport: newline-delimited JSON over TCP.
//!
//! The client writes one [`RpcRequest`] line and reads one [`RpcResponse`]
//! line per connection.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::Transport;
use crate::error::TransportError;
use crate::execution::{CommandOptions, ExecutionResult};

/// Remote-call agent address and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Agent host.
    pub host: String,
    /// Agent port.
    pub port: u16,
    /// Shared secret sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

impl RpcConfig {
    /// Create a config for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            token: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    /// Set the shared secret.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Request line sent to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Shell command to run.
    pub command: String,
    /// Options, omitted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<CommandOptions>,
    /// Shared secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Response line returned by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcResponse {
    /// The command ran; carries its result.
    Result(ExecutionResult),
    /// The agent could not run the command.
    Error(String),
}

/// Executes commands through a remote agent.
#[derive(Debug, Clone)]
pub struct RpcTransport {
    config: RpcConfig,
}

impl RpcTransport {
    /// Create a transport for the given agent.
    pub fn new(config: RpcConfig) -> Self {
        Self { config }
    }

    /// Get the agent settings.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for RpcTransport {
    async fn send(
        &self,
        command: &str,
        options: Option<&CommandOptions>,
    ) -> Result<ExecutionResult, TransportError> {
        let addr = (self.config.host.as_str(), self.config.port);
        let connect_limit = Duration::from_secs(self.config.connect_timeout_secs);
        let stream = timeout(connect_limit, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(connect_limit))??;

        debug!(host = %self.config.host, port = self.config.port, command = %command, "Sending RPC command");

        let request = RpcRequest {
            command: command.to_string(),
            options: options.cloned(),
            token: self.config.token.clone(),
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| TransportError::Protocol(format!("failed to encode request: {e}")))?;
        line.push('\n');

        let (reader, mut writer) = stream.into_split();
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let response = match options.and_then(CommandOptions::timeout_duration) {
            Some(limit) => timeout(limit, read_response(reader))
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => read_response(reader).await?,
        };

        match response {
            RpcResponse::Result(result) => {
                info!(host = %self.config.host, exit_code = ?result.exit_code, "RPC command finished");
                Ok(result)
            }
            RpcResponse::Error(message) => Err(TransportError::Rpc(message)),
        }
    }
}

async fn read_response(reader: OwnedReadHalf) -> Result<RpcResponse, TransportError> {
    let mut line = String::new();
    let read = BufReader::new(reader).read_line(&mut line).await?;
    if read == 0 {
        return Err(TransportError::Protocol(
            "connection closed before response".into(),
        ));
    }
    serde_json::from_str(&line).map_err(|e| TransportError::Protocol(format!("invalid response: {e}")))
}
