//! Command-line interface for exec-session.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::TargetKind;

/// What the binary should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subcommand {
    /// Run a literal command. Everything after `run` is the script.
    Run { script: String },
    /// Report whether a path exists on the target.
    Exists { path: String },
    /// Probe an installed runtime's version.
    Version { runtime: Runtime },
    /// Ping hosts from the target.
    Ping { hosts: Vec<String> },
    /// Copy a local file to the target.
    Push { local: PathBuf, remote: String },
    /// Run a command spec given as JSON.
    Spec { json: String },
}

/// Runtimes with a version probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Php,
    Javac,
    Scalac,
    Node,
    Iojs,
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "php" => Ok(Self::Php),
            "javac" => Ok(Self::Javac),
            "scalac" => Ok(Self::Scalac),
            "node" => Ok(Self::Node),
            "iojs" => Ok(Self::Iojs),
            _ => Err(s.to_string()),
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Transport kind (overrides config file).
    pub target: Option<TargetKind>,
    /// Default working directory for commands.
    pub cwd: Option<PathBuf>,
    /// Default command timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Maximum concurrent pings.
    pub ping_concurrency: Option<usize>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
    /// Subcommand to run.
    pub command: Option<Subcommand>,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);
    let mut name: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("target") => {
                let value: String = parser.value()?.parse()?;
                result.target = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("target", value))?,
                );
            }
            Short('C') | Long("cwd") => {
                result.cwd = Some(parser.value()?.parse()?);
            }
            Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout_secs = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('j') | Long("ping-concurrency") => {
                let value: String = parser.value()?.parse()?;
                result.ping_concurrency = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("ping-concurrency", value))?,
                );
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) if name.is_none() => {
                let command = val.string()?;
                if command == "run" {
                    // the rest of the line is the script, flags included
                    let script: Vec<String> = parser
                        .raw_args()?
                        .map(|a| a.to_string_lossy().into_owned())
                        .collect();
                    positionals.extend(script);
                }
                name = Some(command);
            }
            Value(val) => {
                positionals.push(val.string()?);
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if let Some(name) = name {
        result.command = Some(build_subcommand(&name, positionals)?);
    }

    Ok(result)
}

fn at_most(count: usize, positionals: &[String]) -> Result<(), ArgsError> {
    match positionals.get(count) {
        Some(extra) => Err(ArgsError::UnexpectedArgument(extra.clone())),
        None => Ok(()),
    }
}

fn build_subcommand(name: &str, mut positionals: Vec<String>) -> Result<Subcommand, ArgsError> {
    match name {
        "run" => {
            if positionals.is_empty() {
                return Err(ArgsError::MissingArgument("script"));
            }
            Ok(Subcommand::Run {
                script: positionals.join(" "),
            })
        }
        "exists" => {
            at_most(1, &positionals)?;
            let path = positionals.pop().ok_or(ArgsError::MissingArgument("path"))?;
            Ok(Subcommand::Exists { path })
        }
        "version" => {
            at_most(1, &positionals)?;
            let value = positionals
                .pop()
                .ok_or(ArgsError::MissingArgument("runtime"))?;
            let runtime = value
                .parse()
                .map_err(|_| ArgsError::InvalidValue("runtime", value))?;
            Ok(Subcommand::Version { runtime })
        }
        "ping" => {
            if positionals.is_empty() {
                return Err(ArgsError::MissingArgument("host"));
            }
            Ok(Subcommand::Ping { hosts: positionals })
        }
        "push" => {
            at_most(2, &positionals)?;
            let mut parts = positionals.into_iter();
            let local = parts.next().ok_or(ArgsError::MissingArgument("local"))?;
            let remote = parts.next().ok_or(ArgsError::MissingArgument("remote"))?;
            Ok(Subcommand::Push {
                local: PathBuf::from(local),
                remote,
            })
        }
        "spec" => {
            at_most(1, &positionals)?;
            let json = positionals.pop().ok_or(ArgsError::MissingArgument("json"))?;
            Ok(Subcommand::Spec { json })
        }
        other => Err(ArgsError::UnknownCommand(other.to_string())),
    }
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"exec-session {version}
Run commands on a local or remote target

USAGE:
    exec-session [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
    run <SCRIPT>...             Run a shell command (rest of the line)
    exists <PATH>               Print whether PATH exists on the target
    version <RUNTIME>           Probe php, javac, scalac, node or iojs
    ping <HOST>...              Ping hosts from the target
    push <LOCAL> <REMOTE>       Copy a local file to the target
    spec <JSON>                 Run a command spec, e.g.
                                '{{"method":"mkdir","args":{{"dirname":"/srv/app"}},"exit_codes":[0]}}'

OPTIONS:
    -c, --config <FILE>         Path to configuration file (JSON)
    -t, --target <KIND>         Transport: local, ssh, rpc [default: local]
    -C, --cwd <DIR>             Default working directory for commands
        --timeout <SECS>        Default command timeout
    -j, --ping-concurrency <N>  Maximum concurrent pings [default: 5]
    -l, --log-level <LVL>       Log level (error, warn, info, debug, trace)
    -h, --help                  Print help
    -V, --version               Print version

ENVIRONMENT VARIABLES:
    EXEC_SESSION_TARGET             Transport kind (overrides config)
    EXEC_SESSION_CWD                Working directory (overrides config)
    EXEC_SESSION_TIMEOUT            Command timeout in seconds
    EXEC_SESSION_SSH_PASSWORD       SSH password (overrides config)
    EXEC_SESSION_RPC_TOKEN          Agent token (overrides config)
    EXEC_SESSION_PING_CONCURRENCY   Maximum concurrent pings
    EXEC_SESSION_LOG_LEVEL          Log level (overrides config)
    RUST_LOG                        Alternative log level setting

EXAMPLES:
    # List a directory locally
    exec-session run ls -la /var/log

    # Check for a file over SSH
    exec-session -c /etc/exec-session/prod.json -t ssh exists /srv/app/current

    # Ping three hosts, two at a time
    exec-session -j 2 ping 10.0.0.1 10.0.0.2 10.0.0.3
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("exec-session {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// A subcommand was given too few arguments.
    MissingArgument(&'static str),
    /// Unknown subcommand.
    UnknownCommand(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::MissingArgument(name) => write!(f, "missing argument: <{}>", name),
            Self::UnknownCommand(name) => write!(f, "unknown command: '{}'", name),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
