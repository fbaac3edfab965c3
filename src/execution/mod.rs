//! Command formatting, options and results.
//!
//! This module holds the transport-independent pieces of command execution:
//! - Building command strings from a verb, flags and positionals
//! - Per-command options and how they merge with session defaults
//! - Execution results and version extraction from their output
//!
//! # Example
//!
//! ```
//! use exec_session::execution::{format_command, format_flags};
//!
//! let flags = format_flags(None, Some("p"));
//! assert_eq!(format_command("mkdir", &flags, ["/tmp/x"]), "mkdir -p /tmp/x");
//!
//! let flags = format_flags(Some(""), Some("p"));
//! assert_eq!(format_command("mkdir", &flags, ["/tmp/x"]), "mkdir /tmp/x");
//! ```

mod format;
mod options;
mod result;
mod version;

pub use format::{format_command, format_flags};
pub use options::CommandOptions;
pub use result::ExecutionResult;
pub use version::{extract_version, version_pattern, VersionPattern};
