//! Per-command transport options and their merge rules.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options handed to a transport alongside a command.
///
/// Which fields a transport honours is up to the transport; unknown keys
/// travel in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOptions {
    /// Working directory override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Maximum execution time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Transport-specific options.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CommandOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout_secs = Some(duration.as_secs());
        self
    }

    /// Set a transport-specific option.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Timeout as a duration.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// True when no option is set.
    pub fn is_empty(&self) -> bool {
        self.working_dir.is_none()
            && self.env.is_empty()
            && self.timeout_secs.is_none()
            && self.extra.is_empty()
    }

    /// Shallow merge of `self` over `defaults`; set fields and keys in
    /// `self` win. Neither input is modified.
    pub fn merged_over(&self, defaults: &CommandOptions) -> CommandOptions {
        let mut env = defaults.env.clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut extra = defaults.extra.clone();
        extra.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        CommandOptions {
            working_dir: self.working_dir.clone().or_else(|| defaults.working_dir.clone()),
            env,
            timeout_secs: self.timeout_secs.or(defaults.timeout_secs),
            extra,
        }
    }

    /// Merge per-call options over session defaults, yielding `None` when
    /// the result carries nothing.
    pub fn resolve(defaults: &CommandOptions, call: Option<&CommandOptions>) -> Option<CommandOptions> {
        let merged = match call {
            Some(call) => call.merged_over(defaults),
            None => defaults.clone(),
        };
        if merged.is_empty() {
            None
        } else {
            Some(merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder_chain() {
        let opts = CommandOptions::new()
            .working_dir("/srv/app")
            .env("NODE_ENV", "production")
            .timeout(Duration::from_secs(60));

        assert_eq!(opts.working_dir, Some(PathBuf::from("/srv/app")));
        assert_eq!(opts.env.get("NODE_ENV"), Some(&"production".to_string()));
        assert_eq!(opts.timeout_duration(), Some(Duration::from_secs(60)));
        assert!(!opts.is_empty());
    }

    #[test]
    fn test_envs() {
        let opts = CommandOptions::new().envs([("A", "1"), ("B", "2")]);
        assert_eq!(opts.env.len(), 2);
    }

    #[test]
    fn test_call_options_take_precedence() {
        let defaults = CommandOptions::new()
            .working_dir("/home/deploy")
            .env("A", "default")
            .env("B", "kept");
        let call = CommandOptions::new().working_dir("/tmp").env("A", "call");

        let merged = call.merged_over(&defaults);
        assert_eq!(merged.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(merged.env.get("A"), Some(&"call".to_string()));
        assert_eq!(merged.env.get("B"), Some(&"kept".to_string()));
    }

    #[test]
    fn test_merge_does_not_touch_inputs() {
        let defaults = CommandOptions::new().env("A", "1");
        let call = CommandOptions::new().env("B", "2");
        let _ = call.merged_over(&defaults);

        assert_eq!(defaults.env.len(), 1);
        assert_eq!(call.env.len(), 1);
    }

    #[test]
    fn test_resolve_empty_is_none() {
        let defaults = CommandOptions::default();
        assert!(CommandOptions::resolve(&defaults, None).is_none());
        assert!(CommandOptions::resolve(&defaults, Some(&CommandOptions::new())).is_none());
    }

    #[test]
    fn test_resolve_defaults_only() {
        let defaults = CommandOptions::new().timeout(Duration::from_secs(5));
        let resolved = CommandOptions::resolve(&defaults, None).unwrap();
        assert_eq!(resolved.timeout_secs, Some(5));
    }

    #[test]
    fn test_extra_round_trips_flattened() {
        let opts = CommandOptions::new().extra("pty", true);
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["pty"], true);

        let back: CommandOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
    }
}
