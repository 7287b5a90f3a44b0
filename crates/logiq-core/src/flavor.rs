//! Flavor tags, probe definitions and output matching.
//!
//! A flavor is the detected category of software stack running on a host.
//! Detection is data-driven: each [`FlavorProbe`] names a tag, a priority
//! rank, the commands to run and the output it expects.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a detected flavor (e.g. `VMS`, `Ubuntu`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlavorTag(String);

impl FlavorTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlavorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlavorTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Outcome of flavor detection. `Unknown` is a valid result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "flavor", rename_all = "snake_case")]
pub enum Classification {
    Unknown,
    Matched(FlavorTag),
}

impl Classification {
    pub fn tag(&self) -> Option<&FlavorTag> {
        match self {
            Self::Matched(tag) => Some(tag),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("Unknown"),
            Self::Matched(tag) => write!(f, "{tag}"),
        }
    }
}

/// How expected patterns are compared with probe output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every pattern must appear as a substring.
    #[default]
    Contains,
    /// Every pattern must match as a regular expression.
    Regex,
    /// The whole (trimmed) output must equal every pattern.
    Exact,
}

/// The output a probe expects from its commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl ExpectedOutput {
    pub fn contains(patterns: &[&str]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            mode: MatchMode::Contains,
            case_sensitive: false,
        }
    }

    /// Whether `text` satisfies all patterns. An empty pattern list never matches.
    pub fn matches(&self, text: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let fold = |s: &str| {
            if self.case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };
        let haystack = fold(text);

        self.patterns.iter().all(|pattern| match self.mode {
            MatchMode::Contains => haystack.contains(&fold(pattern)),
            MatchMode::Exact => haystack.trim() == fold(pattern).trim(),
            MatchMode::Regex => RegexBuilder::new(pattern)
                .case_insensitive(!self.case_sensitive)
                .build()
                .map(|re| re.is_match(text))
                .unwrap_or(false),
        })
    }
}

/// A single flavor detection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorProbe {
    pub tag: FlavorTag,
    /// Lower ranks are tried first.
    pub rank: u32,
    /// Commands run in order; their output is combined before matching.
    pub commands: Vec<String>,
    pub expect: ExpectedOutput,
    /// Run the commands through the elevation wrapper.
    #[serde(default)]
    pub elevated: bool,
    /// Per-command timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}
