//! Commands as data.
//!
//! A [`Script`] is either a literal shell command or a [`CommandSpec`]: a
//! named session operation with its arguments and the exit codes it may
//! finish with. Specs deserialize from JSON such as
//!
//! ```json
//! { "method": "mkdir", "args": { "dirname": "/srv/<app>" }, "exit_codes": [0] }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A literal command or a structured directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Script {
    /// Shell command sent to the transport as-is.
    Literal(String),
    /// Session operation validated against allowed exit codes.
    Directive(CommandSpec),
}

impl From<&str> for Script {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for Script {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

impl From<CommandSpec> for Script {
    fn from(value: CommandSpec) -> Self {
        Self::Directive(value)
    }
}

impl From<Invocation> for Script {
    fn from(value: Invocation) -> Self {
        Self::Directive(CommandSpec::new(value))
    }
}

/// A session operation plus its exit-code policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Operation and arguments.
    #[serde(flatten)]
    pub invocation: Invocation,
    /// Allowed exit codes; any code passes when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_codes: Option<Vec<i32>>,
}

impl CommandSpec {
    /// Spec without exit-code validation.
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            exit_codes: None,
        }
    }

    /// Restrict the allowed exit codes.
    pub fn exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.exit_codes = Some(codes.into_iter().collect());
        self
    }

    /// Whether `code` passes this spec's policy.
    ///
    /// With a policy set, a missing code (signal-terminated run) fails.
    pub fn allows(&self, code: Option<i32>) -> bool {
        match (&self.exit_codes, code) {
            (Some(codes), Some(code)) => codes.contains(&code),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Every session operation a [`CommandSpec`] can name.
///
/// Flag fields follow the session's flag rules: absent uses the operation's
/// default flag, an empty string suppresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum Invocation {
    Run {
        script: String,
    },
    Pwd {
        flags: Option<String>,
    },
    Symlink {
        src: String,
        dest: String,
        flags: Option<String>,
    },
    Readlink {
        target: String,
        flags: Option<String>,
    },
    Rm {
        filename: String,
        flags: Option<String>,
    },
    Ls {
        filename: Option<String>,
        flags: Option<String>,
    },
    Cat {
        filename: String,
        flags: Option<String>,
    },
    Mkdir {
        dirname: String,
        flags: Option<String>,
    },
    Chown {
        filename: String,
        owner: String,
        group: String,
        flags: Option<String>,
    },
    Chmod {
        filename: String,
        perms: String,
        flags: Option<String>,
    },
    Rename {
        from: String,
        to: String,
        flags: Option<String>,
    },
    /// With neither `args` nor `post_args` set, `tar` gets no flags at all,
    /// as when [`Session::extract`](super::Session::extract) is called
    /// without [`TarArgs`](super::TarArgs). Set only `post_args` to keep
    /// the default `-xzf`.
    Extract {
        filename: String,
        output_dir: String,
        args: Option<String>,
        post_args: Option<String>,
    },
    Wget {
        url: String,
        output_file: String,
        flags: Option<String>,
    },
    Service {
        name: String,
        action: String,
    },
    Supervisorctl {
        name: String,
        action: String,
    },
    Ping {
        host: String,
        flags: Option<String>,
    },
}

impl Invocation {
    /// Operation name as it appears in the `method` field.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Pwd { .. } => "pwd",
            Self::Symlink { .. } => "symlink",
            Self::Readlink { .. } => "readlink",
            Self::Rm { .. } => "rm",
            Self::Ls { .. } => "ls",
            Self::Cat { .. } => "cat",
            Self::Mkdir { .. } => "mkdir",
            Self::Chown { .. } => "chown",
            Self::Chmod { .. } => "chmod",
            Self::Rename { .. } => "rename",
            Self::Extract { .. } => "extract",
            Self::Wget { .. } => "wget",
            Self::Service { .. } => "service",
            Self::Supervisorctl { .. } => "supervisorctl",
            Self::Ping { .. } => "ping",
        }
    }

    /// Copy of `self` with `f` applied to every string argument.
    pub fn map_args(&self, f: impl Fn(&str) -> String) -> Invocation {
        let m = |s: &String| f(s);
        let o = |s: &Option<String>| s.as_deref().map(&f);
        match self {
            Self::Run { script } => Self::Run { script: m(script) },
            Self::Pwd { flags } => Self::Pwd { flags: o(flags) },
            Self::Symlink { src, dest, flags } => Self::Symlink {
                src: m(src),
                dest: m(dest),
                flags: o(flags),
            },
            Self::Readlink { target, flags } => Self::Readlink {
                target: m(target),
                flags: o(flags),
            },
            Self::Rm { filename, flags } => Self::Rm {
                filename: m(filename),
                flags: o(flags),
            },
            Self::Ls { filename, flags } => Self::Ls {
                filename: o(filename),
                flags: o(flags),
            },
            Self::Cat { filename, flags } => Self::Cat {
                filename: m(filename),
                flags: o(flags),
            },
            Self::Mkdir { dirname, flags } => Self::Mkdir {
                dirname: m(dirname),
                flags: o(flags),
            },
            Self::Chown {
                filename,
                owner,
                group,
                flags,
            } => Self::Chown {
                filename: m(filename),
                owner: m(owner),
                group: m(group),
                flags: o(flags),
            },
            Self::Chmod {
                filename,
                perms,
                flags,
            } => Self::Chmod {
                filename: m(filename),
                perms: m(perms),
                flags: o(flags),
            },
            Self::Rename { from, to, flags } => Self::Rename {
                from: m(from),
                to: m(to),
                flags: o(flags),
            },
            Self::Extract {
                filename,
                output_dir,
                args,
                post_args,
            } => Self::Extract {
                filename: m(filename),
                output_dir: m(output_dir),
                args: o(args),
                post_args: o(post_args),
            },
            Self::Wget {
                url,
                output_file,
                flags,
            } => Self::Wget {
                url: m(url),
                output_file: m(output_file),
                flags: o(flags),
            },
            Self::Service { name, action } => Self::Service {
                name: m(name),
                action: m(action),
            },
            Self::Supervisorctl { name, action } => Self::Supervisorctl {
                name: m(name),
                action: m(action),
            },
            Self::Ping { host, flags } => Self::Ping {
                host: m(host),
                flags: o(flags),
            },
        }
    }
}

/// Substitute `<key>` placeholders with their values.
///
/// Literal scripts are rewritten as a whole; directives only have their
/// string arguments rewritten, leaving the method and exit codes as they
/// were. The input is not modified.
///
/// Substitution is a single left-to-right pass: placeholders appearing in a
/// substituted value are kept verbatim.
pub fn replace_cmd_args(cmd: &Script, replacements: &HashMap<String, String>) -> Script {
    let substitute = |text: &str| substitute_placeholders(text, replacements);

    match cmd {
        Script::Literal(script) => Script::Literal(substitute(script)),
        Script::Directive(spec) => Script::Directive(CommandSpec {
            invocation: spec.invocation.map_args(substitute),
            exit_codes: spec.exit_codes.clone(),
        }),
    }
}

fn substitute_placeholders(text: &str, replacements: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let value = tail
            .find('>')
            .and_then(|close| replacements.get(&tail[..close]).map(|v| (close, v)));
        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                // not a known placeholder; a later '<' may still start one
                out.push('<');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}
