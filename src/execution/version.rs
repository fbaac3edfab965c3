//! Semantic version extraction from command output.

use std::str::FromStr;

use regex::{Regex, RegexBuilder};

/// A version-matching regex, always compiled case-insensitive.
///
/// The first capture group is the version.
#[derive(Debug, Clone)]
pub struct VersionPattern(Regex);

impl VersionPattern {
    /// Compile `pattern` case-insensitive.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Self)
    }

    /// The compiled regex.
    pub fn as_regex(&self) -> &Regex {
        &self.0
    }
}

impl FromStr for VersionPattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Compile a version pattern, case-insensitive.
pub fn version_pattern(pattern: &str) -> Result<VersionPattern, regex::Error> {
    VersionPattern::new(pattern)
}

/// Return the first capture group of the first line matching `pattern`.
///
/// Lines are scanned in order and scanning stops at the first line whose
/// first group matched something non-empty.
pub fn extract_version(output: &str, pattern: &VersionPattern) -> Option<String> {
    output.lines().find_map(|line| {
        pattern
            .0
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|version| !version.is_empty())
            .map(str::to_owned)
    })
}
