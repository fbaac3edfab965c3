//! Shell command string formatting.

/// Render a flag option.
///
/// `opts` distinguishes three cases: `None` falls back to `default`,
/// `Some("")` renders nothing (even when a default exists), anything else
/// renders as `-<opts>`. The same rule applies to `default`.
pub fn format_flags(opts: Option<&str>, default: Option<&str>) -> String {
    match opts.or(default) {
        Some(flags) if !flags.is_empty() => format!("-{flags}"),
        _ => String::new(),
    }
}

/// Join a verb, its flags and positional arguments, skipping empty parts.
pub fn format_command<'a, I>(verb: &str, flags: &'a str, positionals: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut command = String::from(verb);
    for part in std::iter::once(flags).chain(positionals) {
        if !part.is_empty() {
            command.push(' ');
            command.push_str(part);
        }
    }
    command
}
