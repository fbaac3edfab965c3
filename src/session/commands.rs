//! Command vocabulary: file, service and network operations.
//!
//! Every builder validates its required arguments before touching the
//! transport, formats `verb flags positionals`, and runs the result as a
//! literal script.

use futures_util::stream::{self, StreamExt};

use super::action::ServiceAction;
use super::host::Host;
use super::runner::Session;
use crate::error::SessionError;
use crate::execution::{format_command, format_flags, CommandOptions, ExecutionResult};
use crate::Result;

/// Flags used by `ping` when the caller passes none.
pub const DEFAULT_PING_FLAGS: &str = "-c 1 -w 1";

/// Default tar flags when [`TarArgs::args`] is unset.
pub const DEFAULT_TAR_ARGS: &str = "xzf";

/// Flag layout for [`Session::extract`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TarArgs {
    /// Flags before the archive name; `xzf` when unset.
    pub args: Option<String>,
    /// Text appended after the `-C <dir>` clause.
    pub post_args: Option<String>,
}

impl TarArgs {
    /// Use `args` as the tar flags.
    pub fn flags(args: impl Into<String>) -> Self {
        Self {
            args: Some(args.into()),
            post_args: None,
        }
    }

    /// Append `post_args` after the output directory.
    pub fn post_args(mut self, post_args: impl Into<String>) -> Self {
        self.post_args = Some(post_args.into());
        self
    }
}

fn require<'a>(name: &'static str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        Err(SessionError::MissingArgument(name))
    } else {
        Ok(value)
    }
}

impl Session {
    /// `pwd`
    pub async fn pwd(&self, flags: Option<&str>, opts: Option<&CommandOptions>) -> Result<ExecutionResult> {
        let cmd = format_command("pwd", &format_flags(flags, None), []);
        self.run_script(&cmd, opts).await
    }

    /// `ln -nfs <src> <dest>`
    pub async fn symlink(
        &self,
        src: &str,
        dest: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let src = require("src", src)?;
        let dest = require("dest", dest)?;
        let cmd = format_command("ln", &format_flags(flags, Some("nfs")), [src, dest]);
        self.run_script(&cmd, opts).await
    }

    /// `readlink <target>`
    pub async fn readlink(
        &self,
        target: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let target = require("target", target)?;
        let cmd = format_command("readlink", &format_flags(flags, None), [target]);
        self.run_script(&cmd, opts).await
    }

    /// `rm <filename>`
    pub async fn rm(
        &self,
        filename: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let filename = require("filename", filename)?;
        let cmd = format_command("rm", &format_flags(flags, None), [filename]);
        self.run_script(&cmd, opts).await
    }

    /// `ls [filename]`
    pub async fn ls(
        &self,
        filename: Option<&str>,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let cmd = format_command("ls", &format_flags(flags, None), [filename.unwrap_or("")]);
        self.run_script(&cmd, opts).await
    }

    /// `cat <filename>`
    pub async fn cat(
        &self,
        filename: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let filename = require("filename", filename)?;
        let cmd = format_command("cat", &format_flags(flags, None), [filename]);
        self.run_script(&cmd, opts).await
    }

    /// `mkdir -p <dirname>`
    pub async fn mkdir(
        &self,
        dirname: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let dirname = require("dirname", dirname)?;
        let cmd = format_command("mkdir", &format_flags(flags, Some("p")), [dirname]);
        self.run_script(&cmd, opts).await
    }

    /// `chown <owner>:<group> <filename>`
    pub async fn chown(
        &self,
        filename: &str,
        owner: &str,
        group: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let filename = require("filename", filename)?;
        let owner = require("owner", owner)?;
        let group = require("group", group)?;
        let ownership = format!("{owner}:{group}");
        let cmd = format_command("chown", &format_flags(flags, None), [ownership.as_str(), filename]);
        self.run_script(&cmd, opts).await
    }

    /// `chmod <perms> <filename>`
    pub async fn chmod(
        &self,
        filename: &str,
        perms: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let filename = require("filename", filename)?;
        let perms = require("perms", perms)?;
        let cmd = format_command("chmod", &format_flags(flags, None), [perms, filename]);
        self.run_script(&cmd, opts).await
    }

    /// `mv <from> <to>`
    pub async fn rename(
        &self,
        from: &str,
        to: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let from = require("from", from)?;
        let to = require("to", to)?;
        let cmd = format_command("mv", &format_flags(flags, None), [from, to]);
        self.run_script(&cmd, opts).await
    }

    /// `tar <args> <filename> -C <output_dir> [post_args]`
    ///
    /// Without `tar` no flags are passed; with it, unset `args` become `xzf`.
    pub async fn extract(
        &self,
        filename: &str,
        output_dir: &str,
        tar: Option<&TarArgs>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let filename = require("filename", filename)?;
        let output_dir = require("output_dir", output_dir)?;
        let (flags, post_args) = match tar {
            Some(tar) => (
                format_flags(Some(tar.args.as_deref().unwrap_or(DEFAULT_TAR_ARGS)), None),
                tar.post_args.as_deref().unwrap_or(""),
            ),
            None => (String::new(), ""),
        };
        let cmd = format_command("tar", &flags, [filename, "-C", output_dir, post_args]);
        self.run_script(&cmd, opts).await
    }

    /// `wget -O <output_file> <url>`
    pub async fn wget(
        &self,
        url: &str,
        output_file: &str,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let url = require("url", url)?;
        let output_file = require("output_file", output_file)?;
        let cmd = format_command("wget", &format_flags(flags, None), ["-O", output_file, url]);
        self.run_script(&cmd, opts).await
    }

    /// `service <name> <action>`
    pub async fn service(
        &self,
        name: &str,
        action: &str,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let action: ServiceAction = action.parse()?;
        let name = require("name", name)?;
        let cmd = format_command("service", "", [name, action.as_str()]);
        self.run_script(&cmd, opts).await
    }

    /// `supervisorctl <action> <name>`
    pub async fn supervisorctl(
        &self,
        name: &str,
        action: &str,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let action: ServiceAction = action.parse()?;
        let name = require("name", name)?;
        let cmd = format_command("supervisorctl", "", [action.as_str(), name]);
        self.run_script(&cmd, opts).await
    }

    /// `ping -c 1 -w 1 <host>`
    ///
    /// `flags` is passed through verbatim; `None` or empty uses
    /// [`DEFAULT_PING_FLAGS`].
    pub async fn ping(
        &self,
        host: &Host,
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Result<ExecutionResult> {
        let flags = flags.filter(|f| !f.is_empty()).unwrap_or(DEFAULT_PING_FLAGS);
        let cmd = format_command("ping", flags, [host.as_str()]);
        self.run_script(&cmd, opts).await
    }

    /// Ping every host, at most `ping_concurrency` at a time.
    ///
    /// Results come back in input order, one per host; a failed ping does
    /// not affect the others.
    pub async fn ping_all(
        &self,
        hosts: &[Host],
        flags: Option<&str>,
        opts: Option<&CommandOptions>,
    ) -> Vec<Result<ExecutionResult>> {
        stream::iter(hosts)
            .map(|host| self.ping(host, flags, opts))
            .buffered(self.ping_concurrency)
            .collect::<Vec<_>>()
            .await
    }
}
