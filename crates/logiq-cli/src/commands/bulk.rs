//! `logiq bulk hosts.toml`: connectivity and flavor check over many hosts.
//!
//! Hosts are tested one after another through the full session lifecycle.
//! Each result records timing, the detected flavor and whether it disagrees
//! with the flavor configured for the host.
//!
//! ```toml
//! [[host]]
//! name = "director-1"
//! hostname = "10.0.0.5"
//! user = "admin"
//! password = "secret"   # optional, prompted otherwise
//! flavour = "VMS"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use logiq_client::{ConnectTarget, SessionManager, StaticSecret, DEFAULT_SSH_PORT};
use logiq_core::{EventStage, FailureDetail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{follow, Runtime};
use crate::config::Config;
use crate::prompt;

#[derive(Debug, Deserialize)]
struct HostsFile {
    #[serde(default, rename = "host")]
    hosts: Vec<HostEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
    /// Flavor the host is expected to run.
    #[serde(default)]
    pub flavour: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostResult {
    pub name: String,
    pub hostname: String,
    pub username: String,
    pub status: Status,
    pub configured_flavour: Option<String>,
    pub detected_flavour: Option<String>,
    pub flavour_mismatch: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_hosts: usize,
    pub successful: usize,
    pub failed: usize,
    pub mismatches: usize,
    pub unknown_flavour: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct BulkReport<'a> {
    summary: &'a Summary,
    results: &'a [HostResult],
}

pub fn load_hosts(path: &Path) -> Result<Vec<HostEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read hosts file {}", path.display()))?;
    let file: HostsFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse hosts file {}", path.display()))?;
    if file.hosts.is_empty() {
        anyhow::bail!("no [[host]] entries in {}", path.display());
    }
    Ok(file.hosts)
}

/// A detected flavor disagrees with the configured one. Undetected flavors
/// and hosts without a configured flavor never mismatch.
pub fn flavour_mismatch(configured: Option<&str>, detected: Option<&str>) -> bool {
    match (configured, detected) {
        (Some(configured), Some(detected)) => !configured.eq_ignore_ascii_case(detected),
        _ => false,
    }
}

pub fn summarize(results: &[HostResult], duration_ms: u64) -> Summary {
    let successful = results.iter().filter(|r| r.status == Status::Success).count();
    Summary {
        total_hosts: results.len(),
        successful,
        failed: results.len() - successful,
        mismatches: results.iter().filter(|r| r.flavour_mismatch).count(),
        unknown_flavour: results
            .iter()
            .filter(|r| r.status == Status::Success && r.detected_flavour.is_none())
            .count(),
        duration_ms,
    }
}

pub async fn run(cfg: &Config, hosts_file: &Path, json: bool) -> Result<()> {
    let hosts = load_hosts(hosts_file)?;
    info!(hosts = hosts.len(), file = %hosts_file.display(), "bulk test");

    let runtime = Runtime::start(cfg)?;
    let started = Instant::now();
    let mut results = Vec::with_capacity(hosts.len());

    for (i, host) in hosts.iter().enumerate() {
        if !json {
            eprintln!("[{}/{}] {} ({})", i + 1, hosts.len(), host.name, host.hostname);
        }
        let result = test_host(&runtime.manager, cfg, host).await?;
        if !json {
            print_result(&result);
        }
        results.push(result);
    }

    runtime.shutdown().await;
    let summary = summarize(&results, started.elapsed().as_millis() as u64);

    if json {
        let report = BulkReport {
            summary: &summary,
            results: &results,
        };
        let out = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{out}");
    } else {
        print_summary(&summary, &results);
    }

    if summary.failed > 0 {
        anyhow::bail!("{} host(s) failed connectivity test", summary.failed);
    }
    Ok(())
}

async fn test_host(manager: &SessionManager, cfg: &Config, host: &HostEntry) -> Result<HostResult> {
    let username = host.user.clone().unwrap_or_else(|| cfg.default_user());
    let target = ConnectTarget::new(
        username.clone(),
        host.hostname.clone(),
        host.port.unwrap_or(DEFAULT_SSH_PORT),
    );
    let secrets = match &host.password {
        Some(password) => StaticSecret::new(password.clone()),
        None => prompt::secrets_for(&target, false)?,
    };

    let started = Instant::now();
    let (id, events) = manager.connect(target, Arc::new(secrets)).await;
    let last = follow(events, true).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut result = HostResult {
        name: host.name.clone(),
        hostname: host.hostname.clone(),
        username,
        status: Status::Failed,
        configured_flavour: host.flavour.clone(),
        detected_flavour: None,
        flavour_mismatch: false,
        elapsed_ms,
        error: None,
    };

    if last.as_ref().map(|e| e.stage) == Some(EventStage::Complete) {
        let flavor = manager.current_flavor(&id).await?;
        result.status = Status::Success;
        result.detected_flavour = flavor.tag().map(ToString::to_string);
        result.flavour_mismatch = flavour_mismatch(
            host.flavour.as_deref(),
            result.detected_flavour.as_deref(),
        );
        if let Err(e) = manager.disconnect(&id).await {
            warn!(host = %host.name, error = %e, "disconnect failed");
        }
    } else {
        result.error = match manager.acknowledge(&id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(host = %host.name, error = %e, "no failure detail");
                last.and_then(|e| e.error)
            }
        };
    }

    Ok(result)
}

fn print_result(result: &HostResult) {
    let secs = result.elapsed_ms as f64 / 1000.0;
    match (&result.status, &result.error) {
        (Status::Success, _) => {
            let detected = result.detected_flavour.as_deref().unwrap_or("Unknown");
            if result.flavour_mismatch {
                eprintln!(
                    "    ok in {secs:.2}s, flavour mismatch: configured {}, detected {detected}",
                    result.configured_flavour.as_deref().unwrap_or("-")
                );
            } else {
                eprintln!("    ok in {secs:.2}s, flavour {detected}");
            }
        }
        (Status::Failed, Some(detail)) => {
            eprintln!("    failed in {secs:.2}s while {}: {}", detail.stage, detail.message);
            if let Some(diagnosis) = &detail.diagnosis {
                for suggestion in &diagnosis.suggestions {
                    eprintln!("      - {suggestion}");
                }
            }
        }
        (Status::Failed, None) => eprintln!("    failed in {secs:.2}s"),
    }
}

fn print_summary(summary: &Summary, results: &[HostResult]) {
    println!();
    println!(
        "{:<20} {:<18} {:<8} {:<12} {:<12} {:>8}",
        "NAME", "HOSTNAME", "STATUS", "CONFIGURED", "DETECTED", "TIME"
    );
    for r in results {
        let status = match r.status {
            Status::Success => "ok",
            Status::Failed => "FAILED",
        };
        let detected = match (&r.status, &r.detected_flavour) {
            (Status::Failed, _) => "-",
            (_, Some(flavour)) => flavour.as_str(),
            (_, None) => "Unknown",
        };
        let marker = if r.flavour_mismatch { " !" } else { "" };
        println!(
            "{:<20} {:<18} {:<8} {:<12} {:<12} {:>7.2}s{marker}",
            r.name,
            r.hostname,
            status,
            r.configured_flavour.as_deref().unwrap_or("-"),
            detected,
            r.elapsed_ms as f64 / 1000.0
        );
    }

    println!();
    println!(
        "{} hosts: {} ok, {} failed, {} flavour mismatches, {} unknown flavour ({:.1}s)",
        summary.total_hosts,
        summary.successful,
        summary.failed,
        summary.mismatches,
        summary.unknown_flavour,
        summary.duration_ms as f64 / 1000.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Status, detected: Option<&str>, mismatch: bool) -> HostResult {
        HostResult {
            name: "h".into(),
            hostname: "10.0.0.1".into(),
            username: "admin".into(),
            status,
            configured_flavour: Some("VMS".into()),
            detected_flavour: detected.map(str::to_string),
            flavour_mismatch: mismatch,
            elapsed_ms: 10,
            error: None,
        }
    }

    #[test]
    fn parse_hosts_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.toml");
        std::fs::write(
            &path,
            r#"
[[host]]
name = "director-1"
hostname = "10.0.0.5"
user = "admin"
flavour = "VMS"

[[host]]
name = "branch"
hostname = "branch.example"
port = 2222
"#,
        )
        .unwrap();

        let hosts = load_hosts(&path).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].flavour.as_deref(), Some("VMS"));
        assert_eq!(hosts[1].port, Some(2222));
        assert!(hosts[1].user.is_none());
    }

    #[test]
    fn empty_hosts_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.toml");
        std::fs::write(&path, "").unwrap();
        assert!(load_hosts(&path).is_err());
    }

    #[test]
    fn mismatch_rules() {
        assert!(flavour_mismatch(Some("VMS"), Some("VOS")));
        assert!(!flavour_mismatch(Some("VMS"), Some("vms")));
        assert!(!flavour_mismatch(Some("VMS"), None));
        assert!(!flavour_mismatch(None, Some("Ubuntu")));
    }

    #[test]
    fn summary_counts() {
        let results = vec![
            result(Status::Success, Some("VMS"), false),
            result(Status::Success, Some("VOS"), true),
            result(Status::Success, None, false),
            result(Status::Failed, None, false),
        ];
        assert_eq!(
            summarize(&results, 1500),
            Summary {
                total_hosts: 4,
                successful: 3,
                failed: 1,
                mismatches: 1,
                unknown_flavour: 1,
                duration_ms: 1500,
            }
        );
    }
}
