//! Client configuration at `~/.logiq/config.toml`.
//!
//! Provides the default login user, SSH timeouts and trust policy, and scan
//! settings. CLI flags always override config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use logiq_client::{CoordinatorConfig, HostKeyPolicy, KnownHosts};
use logiq_core::{ProbeCatalog, DEFAULT_KEEP_LATEST};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Login user for targets without `user@` (empty = local user).
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bound on each remote command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    /// Trust store path (default `~/.logiq/known_hosts`).
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Newest versions per log family hidden from listings.
    #[serde(default = "default_keep_latest")]
    pub keep_latest: usize,

    #[serde(default)]
    pub require_elevation: bool,

    /// Probe catalog file; the built-in catalog when unset.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// JSON-lines connection history; disabled when unset.
    #[serde(default)]
    pub history: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            keep_latest: default_keep_latest(),
            require_elevation: false,
            catalog: None,
            history: None,
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

fn default_keep_latest() -> usize {
    DEFAULT_KEEP_LATEST
}

impl Config {
    /// `~/.logiq/config.toml`.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".logiq").join("config.toml")
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Login user for targets that do not name one.
    pub fn default_user(&self) -> String {
        if self.default.user.is_empty() {
            logiq_client::transport::local_username()
        } else {
            self.default.user.clone()
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
            keep_latest: self.scan.keep_latest,
            require_elevation: self.scan.require_elevation,
        }
    }

    pub fn known_hosts(&self) -> Result<KnownHosts> {
        match &self.ssh.known_hosts {
            Some(path) => Ok(KnownHosts::new(path)),
            None => KnownHosts::default_location().context("failed to locate known_hosts"),
        }
    }

    pub fn catalog(&self) -> Result<ProbeCatalog> {
        match &self.scan.catalog {
            Some(path) => ProbeCatalog::load(path)
                .with_context(|| format!("failed to load probe catalog {}", path.display())),
            None => Ok(ProbeCatalog::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.ssh.connect_timeout_secs, 10);
        assert_eq!(cfg.ssh.command_timeout_secs, 30);
        assert_eq!(cfg.ssh.host_key_policy, HostKeyPolicy::AcceptNew);
        assert_eq!(cfg.scan.keep_latest, 2);
        assert!(!cfg.scan.require_elevation);
        assert!(cfg.scan.history.is_none());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[default]
user = "versa"

[ssh]
connect_timeout_secs = 5
command_timeout_secs = 60
host_key_policy = "strict"
known_hosts = "/tmp/kh"

[scan]
keep_latest = 3
require_elevation = true
history = "/tmp/history.jsonl"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.default_user(), "versa");
        assert_eq!(cfg.ssh.host_key_policy, HostKeyPolicy::Strict);
        assert_eq!(cfg.known_hosts().unwrap().path(), Path::new("/tmp/kh"));

        let coord = cfg.coordinator_config();
        assert_eq!(coord.connect_timeout, Duration::from_secs(5));
        assert_eq!(coord.command_timeout, Duration::from_secs(60));
        assert_eq!(coord.keep_latest, 3);
        assert!(coord.require_elevation);
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg: Config = toml::from_str("[scan]\nkeep_latest = 0\n").unwrap();
        assert_eq!(cfg.scan.keep_latest, 0);
        assert_eq!(cfg.ssh.command_timeout_secs, 30); // default
        assert!(!cfg.default_user().is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.scan.keep_latest, 2);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ssh]\nhost_key_policy = \"sometimes\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn builtin_catalog_when_unset() {
        let catalog = Config::default().catalog().unwrap();
        assert_eq!(catalog.probes()[0].tag.as_str(), "VMS");
    }
}
