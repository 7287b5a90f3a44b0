//! The probe catalog: flavor probes plus per-flavor log roots.
//!
//! A catalog is loaded once (built-in or from TOML), validated, and then
//! shared read-only between sessions.

use crate::error::{LogiqError, LogiqResult};
use crate::flavor::{Classification, FlavorProbe, FlavorTag, MatchMode};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("builtin_catalog.toml");

/// On-disk catalog structure.
#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "probe")]
    probes: Vec<FlavorProbe>,
    #[serde(default)]
    paths: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_paths")]
    default_paths: Vec<String>,
    #[serde(default = "default_archive_suffix")]
    archive_suffix: String,
    #[serde(default)]
    name_filter: Option<String>,
}

fn default_paths() -> Vec<String> {
    vec!["/var/log".to_string()]
}

fn default_archive_suffix() -> String {
    ".gz".to_string()
}

/// Immutable, validated probe catalog.
#[derive(Debug, Clone)]
pub struct ProbeCatalog {
    probes: Vec<FlavorProbe>,
    paths: BTreeMap<FlavorTag, Vec<String>>,
    default_paths: Vec<String>,
    archive_suffix: String,
    name_filter: Option<Regex>,
}

impl ProbeCatalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_toml_str(BUILTIN_CATALOG).expect("built-in catalog is valid")
    }

    /// Parse and validate a catalog from TOML text.
    pub fn from_toml_str(content: &str) -> LogiqResult<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_file(file)
    }

    /// Load a catalog from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> LogiqResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LogiqError::Config(format!("failed to read catalog {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Build a catalog from probes and paths directly.
    pub fn new(
        probes: Vec<FlavorProbe>,
        paths: BTreeMap<FlavorTag, Vec<String>>,
        default_paths: Vec<String>,
    ) -> LogiqResult<Self> {
        let file = CatalogFile {
            probes,
            paths: paths
                .into_iter()
                .map(|(tag, roots)| (tag.as_str().to_string(), roots))
                .collect(),
            default_paths,
            archive_suffix: default_archive_suffix(),
            name_filter: None,
        };
        Self::from_file(file)
    }

    fn from_file(file: CatalogFile) -> LogiqResult<Self> {
        validate(&file)?;

        let mut probes = file.probes;
        // Stable: equal ranks keep declaration order.
        probes.sort_by_key(|p| p.rank);

        let name_filter = file.name_filter.as_deref().map(Regex::new).transpose()?;

        Ok(Self {
            probes,
            paths: file
                .paths
                .into_iter()
                .map(|(tag, roots)| (FlavorTag::new(tag), roots))
                .collect(),
            default_paths: file.default_paths,
            archive_suffix: file.archive_suffix,
            name_filter,
        })
    }

    /// Probes in the order they must be tried.
    pub fn probes(&self) -> &[FlavorProbe] {
        &self.probes
    }

    /// Root paths to scan for a classification; unknown or unmapped flavors
    /// fall back to the generic defaults.
    pub fn roots_for(&self, classification: &Classification) -> &[String] {
        classification
            .tag()
            .and_then(|tag| self.paths.get(tag))
            .map(Vec::as_slice)
            .unwrap_or(&self.default_paths)
    }

    pub fn default_paths(&self) -> &[String] {
        &self.default_paths
    }

    pub fn archive_suffix(&self) -> &str {
        &self.archive_suffix
    }

    /// Optional file-name filter applied during scanning.
    pub fn name_filter(&self) -> Option<&Regex> {
        self.name_filter.as_ref()
    }
}

impl Default for ProbeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate(file: &CatalogFile) -> LogiqResult<()> {
    for probe in &file.probes {
        if probe.tag.as_str().trim().is_empty() {
            return Err(LogiqError::Config("probe with empty tag".into()));
        }
        if probe.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(LogiqError::Config(format!(
                "probe '{}' has no commands",
                probe.tag
            )));
        }
        if probe.expect.patterns.is_empty() {
            return Err(LogiqError::Config(format!(
                "probe '{}' has no expected patterns",
                probe.tag
            )));
        }
        if probe.expect.mode == MatchMode::Regex {
            for pattern in &probe.expect.patterns {
                Regex::new(pattern)?;
            }
        }
    }

    for (tag, roots) in &file.paths {
        if let Some(bad) = roots.iter().find(|r| !r.starts_with('/')) {
            return Err(LogiqError::Config(format!(
                "path '{bad}' for flavor '{tag}' is not absolute"
            )));
        }
    }

    if file.default_paths.is_empty() {
        return Err(LogiqError::Config("default_paths must not be empty".into()));
    }
    if let Some(bad) = file.default_paths.iter().find(|r| !r.starts_with('/')) {
        return Err(LogiqError::Config(format!(
            "default path '{bad}' is not absolute"
        )));
    }
    if file.archive_suffix.is_empty() {
        return Err(LogiqError::Config("archive_suffix must not be empty".into()));
    }

    Ok(())
}
