//! Sessions over a transport.
//!
//! A [`Session`] pairs one transport with default command options and
//! exposes the command vocabulary on top of it: file operations, service
//! control, version probes, pings and file pushes. Commands can also be
//! described as data with [`CommandSpec`].

mod action;
mod commands;
mod directive;
mod event;
mod host;
mod probe;
mod runner;

pub use action::ServiceAction;
pub use commands::{TarArgs, DEFAULT_PING_FLAGS, DEFAULT_TAR_ARGS};
pub use directive::{replace_cmd_args, CommandSpec, Invocation, Script};
pub use event::CommandEvent;
pub use host::Host;
pub use runner::{Session, DEFAULT_PING_CONCURRENCY};
