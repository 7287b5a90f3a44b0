//! Remote log inventory walk.
//!
//! Directories are listed one at a time over the session, so a caller
//! driving [`ScanWalk::next`] sees entries as soon as their directory has
//! been read and can stop between remote commands.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use logiq_core::inventory::{is_archive, parse_listing, ListingKind};
use logiq_core::{LogEntry, LogiqResult, ProbeCatalog};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::privilege::Elevator;
use crate::transport::RemoteExec;

/// Remote command listing the direct members of `dir`, one per line as
/// `type<TAB>mtime<TAB>size<TAB>path`.
fn listing_command(dir: &str) -> String {
    format!(
        "find {} -mindepth 1 -maxdepth 1 \\( -type f -o -type d \\) -printf '%y\\t%T@\\t%s\\t%p\\n'",
        shell_escape::unix::escape(dir.into())
    )
}

/// A directory that could not be read. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Entry(LogEntry),
    Warning(ScanWarning),
}

/// Everything a finished walk produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub entries: Vec<LogEntry>,
    pub warnings: Vec<ScanWarning>,
}

/// Scan settings derived from the catalog.
#[derive(Debug, Clone)]
pub struct LogScanner {
    archive_suffix: String,
    name_filter: Option<Regex>,
    command_timeout: Duration,
    elevator: Elevator,
}

impl LogScanner {
    pub fn new(catalog: &ProbeCatalog, command_timeout: Duration) -> Self {
        Self {
            archive_suffix: catalog.archive_suffix().to_string(),
            name_filter: catalog.name_filter().cloned(),
            command_timeout,
            elevator: Elevator::none(),
        }
    }

    /// List directories through `elevator` so root-only logs are visible.
    pub fn with_elevator(mut self, elevator: Elevator) -> Self {
        self.elevator = elevator;
        self
    }

    /// Start a lazy walk over `roots`. Nested and repeated roots are visited once.
    pub fn walk(&self, session: Arc<dyn RemoteExec>, roots: &[String]) -> ScanWalk {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for root in roots {
            let root = normalize(root);
            if visited.insert(root.clone()) {
                queue.push_back(root);
            }
        }

        ScanWalk {
            scanner: self.clone(),
            session,
            queue,
            visited,
            seen_files: HashSet::new(),
            ready: VecDeque::new(),
        }
    }
}

pub struct ScanWalk {
    scanner: LogScanner,
    session: Arc<dyn RemoteExec>,
    queue: VecDeque<String>,
    visited: HashSet<String>,
    seen_files: HashSet<String>,
    ready: VecDeque<ScanItem>,
}

impl ScanWalk {
    /// Next entry or warning. `None` once every directory has been listed;
    /// a transport error ends the walk.
    pub async fn next(&mut self) -> Option<LogiqResult<ScanItem>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }

            let dir = self.queue.pop_front()?;
            if let Err(e) = self.list_directory(&dir).await {
                self.queue.clear();
                return Some(Err(e));
            }
        }
    }

    /// Drive the walk to completion.
    pub async fn collect(mut self) -> LogiqResult<ScanReport> {
        let mut report = ScanReport::default();
        while let Some(item) = self.next().await {
            match item? {
                ScanItem::Entry(entry) => report.entries.push(entry),
                ScanItem::Warning(warning) => report.warnings.push(warning),
            }
        }
        Ok(report)
    }

    /// Directories still waiting to be listed.
    pub fn pending_directories(&self) -> usize {
        self.queue.len()
    }

    async fn list_directory(&mut self, dir: &str) -> LogiqResult<()> {
        let output = self
            .scanner
            .elevator
            .run(
                self.session.as_ref(),
                &listing_command(dir),
                self.scanner.command_timeout,
            )
            .await?;

        if !output.success() {
            let mut messages: Vec<String> = output
                .stderr
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if messages.is_empty() {
                messages.push(match output.exit_status {
                    Some(code) => format!("listing exited with status {code}"),
                    None => "listing exited without a status".to_string(),
                });
            }
            for message in messages {
                warn!(dir = %dir, message = %message, "directory skipped");
                self.ready.push_back(ScanItem::Warning(ScanWarning {
                    path: dir.to_string(),
                    message,
                }));
            }
        }

        let mut records = parse_listing(&output.stdout);
        records.sort_by(|a, b| a.path.cmp(&b.path));

        let mut files = 0usize;
        for record in records {
            match record.kind {
                ListingKind::Directory => {
                    let path = normalize(&record.path);
                    if self.visited.insert(path.clone()) {
                        self.queue.push_back(path);
                    }
                }
                ListingKind::File => {
                    let name = record.path.rsplit('/').next().unwrap_or(&record.path);
                    if is_archive(name, &self.scanner.archive_suffix) {
                        continue;
                    }
                    if let Some(filter) = &self.scanner.name_filter {
                        if !filter.is_match(name) {
                            continue;
                        }
                    }
                    if !self.seen_files.insert(record.path.clone()) {
                        continue;
                    }
                    files += 1;
                    self.ready.push_back(ScanItem::Entry(LogEntry::new(
                        record.path,
                        record.modified,
                        record.size,
                    )));
                }
            }
        }

        debug!(dir = %dir, files, queued = self.queue.len(), "directory listed");
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
