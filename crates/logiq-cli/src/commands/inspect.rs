//! `logiq inspect [user@]host[:port]`: full session lifecycle.
//!
//! Connects, detects the flavor, negotiates elevation and scans the log
//! tree while streaming progress to stderr, then prints each log family's
//! older versions and a per-directory summary. Ctrl-C cancels the session.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use logiq_client::{ScanWarning, SessionManager};
use logiq_core::{Classification, LogEntry};
use serde::Serialize;
use tracing::{info, warn};

use super::{ensure_complete, follow, parse_target, Runtime};
use crate::config::Config;
use crate::prompt;

#[derive(Debug, Serialize)]
struct InspectReport {
    session_id: String,
    target: String,
    flavor: Classification,
    keep_latest: usize,
    families: BTreeMap<String, Vec<LogEntry>>,
    directories: BTreeMap<String, usize>,
    warnings: Vec<ScanWarning>,
}

pub async fn run(cfg: &Config, target: &str, json: bool, separate_admin: bool) -> Result<()> {
    let target = parse_target(target, cfg)?;
    let secrets = prompt::secrets_for(&target, separate_admin)?;
    info!(target = %target, "inspect");

    let runtime = Runtime::start(cfg)?;
    let (id, events) = runtime
        .manager
        .connect(target.clone(), Arc::new(secrets))
        .await;

    let last = tokio::select! {
        last = follow(events, false) => last,
        _ = tokio::signal::ctrl_c() => {
            warn!(session_id = %id, "interrupted, cancelling session");
            runtime.manager.disconnect(&id).await.context("failed to cancel session")?;
            runtime.shutdown().await;
            anyhow::bail!("interrupted");
        }
    };

    let outcome = match ensure_complete(last) {
        Ok(()) => report(&runtime.manager, &id, &target.to_string(), cfg, json).await,
        Err(e) => Err(e),
    };

    if let Err(e) = runtime.manager.disconnect(&id).await {
        warn!(session_id = %id, error = %e, "disconnect failed");
    }
    runtime.shutdown().await;
    outcome
}

async fn report(
    manager: &SessionManager,
    id: &str,
    target: &str,
    cfg: &Config,
    json: bool,
) -> Result<()> {
    let flavor = manager.current_flavor(id).await?;
    let families = manager.list_log_families(id).await?;
    let inventory = manager.inventory(id).await?;

    let report = InspectReport {
        session_id: id.to_string(),
        target: target.to_string(),
        flavor,
        keep_latest: cfg.scan.keep_latest,
        families,
        directories: inventory.directory_summary(),
        warnings: inventory.warnings,
    };

    if json {
        let out = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{out}");
        return Ok(());
    }

    print_text(&report, inventory.families.len());
    Ok(())
}

fn print_text(report: &InspectReport, family_count: usize) {
    println!("Host:    {}", report.target);
    println!("Flavor:  {}", report.flavor);
    println!(
        "Logs:    {family_count} families, newest {} per family hidden",
        report.keep_latest
    );

    let with_history: Vec<_> = report
        .families
        .iter()
        .filter(|(_, entries)| !entries.is_empty())
        .collect();

    println!();
    if with_history.is_empty() {
        println!("No family has older versions.");
    }
    for (family, entries) in with_history {
        println!("{family} ({} older)", entries.len());
        for entry in entries {
            println!("    {:>12}  {}", entry.size, entry.path);
        }
    }

    println!();
    println!("{:<40} {}", "DIRECTORY", "FILES");
    println!(
        "{:<40} {}",
        "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}"
    );
    for (dir, count) in &report.directories {
        println!("{dir:<40} {count}");
    }

    if !report.warnings.is_empty() {
        println!("\n{} director(ies) skipped:", report.warnings.len());
        for warning in &report.warnings {
            println!("    {}: {}", warning.path, warning.message);
        }
    }
}
