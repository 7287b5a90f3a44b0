//! Host key trust store and verification policy.
//!
//! Stores host key fingerprints at `~/.logiq/known_hosts`.
//! Format: one `host:port fingerprint` pair per line.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use logiq_core::{LogiqError, LogiqResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Result of looking a host up in the trust store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    /// The host is known and the fingerprint matches.
    Known,
    /// The host has never been seen before.
    Unknown,
    /// The host is known but the fingerprint has changed.
    Changed {
        /// The previously stored fingerprint.
        expected: String,
    },
}

/// Known hosts file manager.
#[derive(Debug, Clone)]
pub struct KnownHosts {
    path: PathBuf,
}

impl KnownHosts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Known hosts at the default location (`~/.logiq/known_hosts`).
    pub fn default_location() -> LogiqResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| LogiqError::Config("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".logiq").join("known_hosts")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify a host's fingerprint against stored records.
    pub fn verify_host(&self, host: &str, fingerprint: &str) -> LogiqResult<HostStatus> {
        let entries = self.load_entries()?;

        match entries.iter().find(|(h, _)| h == host) {
            Some((_, stored)) if stored == fingerprint => Ok(HostStatus::Known),
            Some((_, stored)) => Ok(HostStatus::Changed {
                expected: stored.clone(),
            }),
            None => Ok(HostStatus::Unknown),
        }
    }

    /// Add or replace a host's fingerprint.
    pub fn add_host(&self, host: &str, fingerprint: &str) -> LogiqResult<()> {
        let mut entries = self.load_entries()?;
        entries.retain(|(h, _)| h != host);
        entries.push((host.to_string(), fingerprint.to_string()));
        self.save_entries(&entries)
    }

    /// Remove a host entry. Returns whether anything was removed.
    pub fn remove_host(&self, host: &str) -> LogiqResult<bool> {
        let mut entries = self.load_entries()?;
        let len_before = entries.len();
        entries.retain(|(h, _)| h != host);
        let removed = entries.len() < len_before;

        if removed {
            self.save_entries(&entries)?;
        }

        Ok(removed)
    }

    /// All known hosts and their fingerprints.
    pub fn list(&self) -> LogiqResult<Vec<(String, String)>> {
        self.load_entries()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn load_entries(&self) -> LogiqResult<Vec<(String, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let entries = content
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let (host, fp) = line.split_once(' ')?;
                let fp = fp.trim();
                if fp.is_empty() {
                    return None;
                }
                Some((host.to_string(), fp.to_string()))
            })
            .collect();

        Ok(entries)
    }

    fn save_entries(&self, entries: &[(String, String)]) -> LogiqResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
                }
            }
        }

        let mut content: String = entries
            .iter()
            .map(|(host, fp)| format!("{host} {fp}\n"))
            .collect();
        if content.is_empty() {
            content.push('\n');
        }

        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

/// What to do with a server's host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept every key without recording it.
    AcceptAny,
    /// Trust on first use: record unknown keys, reject changed ones.
    #[default]
    AcceptNew,
    /// Only accept keys already in the trust store.
    Strict,
}

impl HostKeyPolicy {
    /// Decide whether `fingerprint` is acceptable for `host`.
    ///
    /// Under `AcceptNew` an unknown host is recorded before returning.
    pub fn check(self, store: &KnownHosts, host: &str, fingerprint: &str) -> LogiqResult<()> {
        if self == Self::AcceptAny {
            warn!(host = %host, fingerprint = %fingerprint, "accepting host key without verification");
            return Ok(());
        }

        match store.verify_host(host, fingerprint)? {
            HostStatus::Known => Ok(()),
            HostStatus::Changed { expected } => Err(LogiqError::HostKey(format!(
                "host key for {host} changed (expected {expected}, got {fingerprint})"
            ))),
            HostStatus::Unknown if self == Self::Strict => Err(LogiqError::HostKey(format!(
                "{host} is not in {}",
                store.path().display()
            ))),
            HostStatus::Unknown => {
                store.add_host(host, fingerprint)?;
                info!(host = %host, fingerprint = %fingerprint, "recorded new host key");
                Ok(())
            }
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AcceptAny => "accept-any",
            Self::AcceptNew => "accept-new",
            Self::Strict => "strict",
        })
    }
}

impl FromStr for HostKeyPolicy {
    type Err = LogiqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept-any" => Ok(Self::AcceptAny),
            "accept-new" => Ok(Self::AcceptNew),
            "strict" => Ok(Self::Strict),
            other => Err(LogiqError::Config(format!(
                "unknown host key policy '{other}' (expected accept-any, accept-new or strict)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_known_hosts() -> (tempfile::TempDir, KnownHosts) {
        let dir = tempfile::tempdir().unwrap();
        let kh = KnownHosts::new(dir.path().join("logiq").join("known_hosts"));
        (dir, kh)
    }

    #[test]
    fn unknown_host() {
        let (_dir, kh) = temp_known_hosts();
        assert_eq!(
            kh.verify_host("example.com:22", "SHA256:abc").unwrap(),
            HostStatus::Unknown
        );
    }

    #[test]
    fn detect_changed_fingerprint() {
        let (_dir, kh) = temp_known_hosts();
        kh.add_host("example.com:22", "abc123").unwrap();
        assert_eq!(
            kh.verify_host("example.com:22", "def456").unwrap(),
            HostStatus::Changed {
                expected: "abc123".to_string()
            }
        );
    }

    #[test]
    fn update_and_remove_host() {
        let (_dir, kh) = temp_known_hosts();
        kh.add_host("example.com:22", "abc123").unwrap();
        kh.add_host("example.com:22", "def456").unwrap();
        assert_eq!(kh.list().unwrap().len(), 1);
        assert_eq!(
            kh.verify_host("example.com:22", "def456").unwrap(),
            HostStatus::Known
        );

        assert!(kh.remove_host("example.com:22").unwrap());
        assert!(!kh.remove_host("example.com:22").unwrap());
        assert!(kh.list().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, kh) = temp_known_hosts();
        kh.add_host("h:22", "fp").unwrap();
        let mode = fs::metadata(kh.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn accept_new_records_then_rejects_changes() {
        let (_dir, kh) = temp_known_hosts();
        let policy = HostKeyPolicy::AcceptNew;
        policy.check(&kh, "h:22", "fp1").unwrap();
        assert_eq!(kh.verify_host("h:22", "fp1").unwrap(), HostStatus::Known);
        policy.check(&kh, "h:22", "fp1").unwrap();

        let err = policy.check(&kh, "h:22", "fp2").unwrap_err();
        assert!(matches!(err, LogiqError::HostKey(_)));
    }

    #[test]
    fn strict_rejects_unknown() {
        let (_dir, kh) = temp_known_hosts();
        assert!(HostKeyPolicy::Strict.check(&kh, "h:22", "fp").is_err());
        kh.add_host("h:22", "fp").unwrap();
        assert!(HostKeyPolicy::Strict.check(&kh, "h:22", "fp").is_ok());
    }

    #[test]
    fn accept_any_does_not_record() {
        let (_dir, kh) = temp_known_hosts();
        HostKeyPolicy::AcceptAny.check(&kh, "h:22", "fp").unwrap();
        assert!(kh.list().unwrap().is_empty());
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!(
            "strict".parse::<HostKeyPolicy>().unwrap(),
            HostKeyPolicy::Strict
        );
        assert!("yolo".parse::<HostKeyPolicy>().is_err());
        assert_eq!(HostKeyPolicy::default().to_string(), "accept-new");
    }
}
