//! File transfer to a session target.
//!
//! Transfers do not go through [`Transport::send`](super::Transport::send);
//! copying a file is a separate protocol from running a command.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use russh::ChannelMsg;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ssh::{connect, SshConfig};
use crate::error::{TransferError, TransportError};

/// Where and how to copy a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferMeta {
    /// Destination path on the target.
    pub path: Option<String>,
    /// Connection details, for transfers that open their own connection.
    pub connection: Option<SshConfig>,
    /// Permission bits for the created file; taken from the source when unset.
    pub mode: Option<u32>,
}

impl TransferMeta {
    /// Metadata with connection details.
    pub fn with_connection(connection: SshConfig) -> Self {
        Self {
            connection: Some(connection),
            ..Self::default()
        }
    }

    /// Copy of `self` with `path` set to `dest`.
    pub fn with_path(&self, dest: impl Into<String>) -> Self {
        Self {
            path: Some(dest.into()),
            ..self.clone()
        }
    }
}

/// Copies a local file to a target.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Copy `local` to the destination described by `meta`.
    async fn transfer(&self, local: &Path, meta: &TransferMeta) -> Result<(), TransferError>;
}

/// Uploads over SSH using the scp sink protocol (`scp -t`).
#[derive(Debug, Clone, Default)]
pub struct ScpTransfer {
    connection: Option<SshConfig>,
}

impl ScpTransfer {
    /// Transfer that takes its connection from each call's metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfer that falls back to `connection` when the metadata has none.
    pub fn with_connection(connection: SshConfig) -> Self {
        Self {
            connection: Some(connection),
        }
    }
}

#[async_trait]
impl Transfer for ScpTransfer {
    async fn transfer(&self, local: &Path, meta: &TransferMeta) -> Result<(), TransferError> {
        let dest = meta.path.as_deref().ok_or(TransferError::MissingPath)?;
        let connection = meta
            .connection
            .as_ref()
            .or(self.connection.as_ref())
            .ok_or(TransferError::MissingConnection)?;

        let contents = tokio::fs::read(local).await?;
        let mode = match meta.mode {
            Some(mode) => mode,
            None => source_mode(local).await?,
        };
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        debug!(host = %connection.host, local = %local.display(), dest = %dest, "Starting scp upload");

        let handle = connect(connection).await?;
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Ssh(format!("failed to open channel: {e}")))?;

        let quoted = shlex::try_quote(dest)
            .map_err(|_| TransferError::Rejected(format!("unquotable path: {dest:?}")))?;
        channel
            .exec(true, format!("scp -t {quoted}"))
            .await
            .map_err(|e| TransportError::Ssh(format!("failed to exec scp: {e}")))?;

        let header = format!("C{:04o} {} {}\n", mode & 0o7777, contents.len(), name);
        let upload = async {
            wait_ack(&mut channel).await?;
            channel
                .data(header.as_bytes())
                .await
                .map_err(|e| TransportError::Ssh(e.to_string()))?;
            wait_ack(&mut channel).await?;
            channel
                .data(&contents[..])
                .await
                .map_err(|e| TransportError::Ssh(e.to_string()))?;
            channel
                .data(&[0u8][..])
                .await
                .map_err(|e| TransportError::Ssh(e.to_string()))?;
            wait_ack(&mut channel).await?;
            channel
                .eof()
                .await
                .map_err(|e| TransportError::Ssh(e.to_string()))?;
            Ok::<(), TransferError>(())
        };
        let outcome = upload.await;

        let _ = channel.close().await;
        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await;

        outcome?;
        info!(host = %connection.host, dest = %dest, bytes = contents.len(), "File uploaded");
        Ok(())
    }
}

/// Read one scp acknowledgement: `0` is OK, `1`/`2` carry a message.
async fn wait_ack(channel: &mut russh::Channel<russh::client::Msg>) -> Result<(), TransferError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { ref data }) => {
                return match data.first() {
                    Some(0) => Ok(()),
                    Some(_) => {
                        let message = String::from_utf8_lossy(&data[1..]).trim().to_string();
                        Err(TransferError::Rejected(message))
                    }
                    None => continue,
                };
            }
            Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                return Err(TransferError::Rejected(
                    String::from_utf8_lossy(data).trim().to_string(),
                ));
            }
            Some(ChannelMsg::ExitStatus { exit_status }) if exit_status != 0 => {
                return Err(TransferError::Rejected(format!(
                    "scp exited with status {exit_status}"
                )));
            }
            Some(_) => continue,
            None => {
                return Err(TransferError::Rejected(
                    "channel closed before acknowledgement".into(),
                ))
            }
        }
    }
}

#[cfg(unix)]
async fn source_mode(local: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(tokio::fs::metadata(local).await?.permissions().mode())
}

#[cfg(not(unix))]
async fn source_mode(_local: &Path) -> std::io::Result<u32> {
    Ok(0o644)
}

#[cfg(unix)]
async fn apply_mode(dest: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(dest, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn apply_mode(_dest: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Copies within the local filesystem, for sessions targeting this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalCopyTransfer;

#[async_trait]
impl Transfer for LocalCopyTransfer {
    async fn transfer(&self, local: &Path, meta: &TransferMeta) -> Result<(), TransferError> {
        let dest = PathBuf::from(meta.path.as_deref().ok_or(TransferError::MissingPath)?);
        let dest = if tokio::fs::metadata(&dest)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            match local.file_name() {
                Some(name) => dest.join(name),
                None => dest,
            }
        } else {
            dest
        };

        let bytes = tokio::fs::copy(local, &dest).await?;
        if let Some(mode) = meta.mode {
            apply_mode(&dest, mode).await?;
        }

        debug!(local = %local.display(), dest = %dest.display(), bytes, "File copied");
        Ok(())
    }
}
