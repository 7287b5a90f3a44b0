//! Grouping log entries into families and the chronological version filter.

use crate::inventory::LogEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Most-recent versions per family hidden from the filtered view.
pub const DEFAULT_KEEP_LATEST: usize = 2;

/// Rotated/versioned copies of one logical log, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFamily {
    pub name: String,
    pub entries: Vec<LogEntry>,
}

impl LogFamily {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest entry in the family.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.last()
    }
}

/// Group entries by family name.
///
/// Entries inside each family are sorted by modification time ascending; the
/// sort is stable, so equal timestamps keep their scan order.
pub fn group(entries: impl IntoIterator<Item = LogEntry>) -> BTreeMap<String, LogFamily> {
    let mut families: BTreeMap<String, LogFamily> = BTreeMap::new();

    for entry in entries {
        families
            .entry(entry.family.clone())
            .or_insert_with(|| LogFamily {
                name: entry.family.clone(),
                entries: Vec::new(),
            })
            .entries
            .push(entry);
    }

    for family in families.values_mut() {
        family.entries.sort_by_key(|e| e.modified);
    }

    families
}

/// Entries of `family` minus the `keep_latest` newest, oldest first.
///
/// Families with `keep_latest` or fewer members yield an empty slice.
pub fn filter(family: &LogFamily, keep_latest: usize) -> &[LogEntry] {
    let len = family.entries.len();
    if len <= keep_latest {
        return &[];
    }
    &family.entries[..len - keep_latest]
}

/// Filtered view over every family. Families whose view is empty are kept
/// with an empty list so callers can still see they exist.
pub fn filtered_view(
    families: &BTreeMap<String, LogFamily>,
    keep_latest: usize,
) -> BTreeMap<String, Vec<LogEntry>> {
    families
        .iter()
        .map(|(name, family)| (name.clone(), filter(family, keep_latest).to_vec()))
        .collect()
}

/// Directory key for files sitting directly in the log root.
pub const ROOT_DIRECTORY_KEY: &str = "var-log-root";

/// Number of files per directory, relative to `root`.
///
/// Files directly under `root` are counted under [`ROOT_DIRECTORY_KEY`].
pub fn directory_summary<'a>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
    root: &str,
) -> BTreeMap<String, usize> {
    let root = root.trim_end_matches('/');
    let mut counts = BTreeMap::new();

    for entry in entries {
        let dir = entry.directory();
        let key = match dir.strip_prefix(root) {
            Some("") => ROOT_DIRECTORY_KEY.to_string(),
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
            _ => dir.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, modified: i64) -> LogEntry {
        LogEntry::new(path, modified, 100)
    }

    fn names(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.file_name()).collect()
    }

    #[test]
    fn keeps_oldest_versions_of_rotated_family() {
        let entries = vec![
            entry("/var/log/app.log.3", 3),
            entry("/var/log/app.log.1", 1),
            entry("/var/log/app.log.4", 4),
            entry("/var/log/app.log.2", 2),
        ];
        let families = group(entries);
        let family = &families["/var/log/app.log"];
        assert_eq!(
            names(&family.entries),
            vec!["app.log.1", "app.log.2", "app.log.3", "app.log.4"]
        );
        assert_eq!(
            names(filter(family, DEFAULT_KEEP_LATEST)),
            vec!["app.log.1", "app.log.2"]
        );
    }

    #[test]
    fn small_families_yield_empty_view() {
        let families = group(vec![entry("/var/log/a.log", 1), entry("/var/log/a.log.1", 0)]);
        let family = &families["/var/log/a.log"];
        assert!(filter(family, 2).is_empty());
        assert!(filter(family, 3).is_empty());
        assert_eq!(filter(family, 1).len(), 1);
    }

    #[test]
    fn keep_zero_returns_everything() {
        let families = group(vec![entry("/var/log/a.log", 1)]);
        assert_eq!(filter(&families["/var/log/a.log"], 0).len(), 1);
    }

    #[test]
    fn equal_timestamps_keep_scan_order() {
        let families = group(vec![
            entry("/var/log/x.log.b", 5),
            entry("/var/log/x.log.1", 5),
            entry("/var/log/x.log.2", 5),
        ]);
        let family = &families["/var/log/x.log"];
        assert_eq!(names(&family.entries), vec!["x.log.1", "x.log.2"]);
        let other = &families["/var/log/x.log.b"];
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn filter_never_crosses_families() {
        let entries = vec![
            entry("/var/log/a.log", 10),
            entry("/var/log/a.log.1", 9),
            entry("/var/log/a.log.2", 8),
            entry("/var/log/b.log", 1),
            entry("/var/log/b.log.1", 0),
        ];
        let view = filtered_view(&group(entries), 2);
        assert_eq!(names(&view["/var/log/a.log"]), vec!["a.log.2"]);
        assert!(view["/var/log/b.log"].is_empty());
    }

    #[test]
    fn grouping_is_deterministic() {
        let entries = vec![
            entry("/var/log/syslog", 30),
            entry("/var/log/syslog.1", 20),
            entry("/var/log/syslog.2", 10),
            entry("/var/log/nginx/access.log", 5),
        ];
        let first = filtered_view(&group(entries.clone()), 2);
        let second = filtered_view(&group(entries), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn latest_is_newest_entry() {
        let families = group(vec![entry("/var/log/a.log.1", 1), entry("/var/log/a.log", 2)]);
        assert_eq!(
            families["/var/log/a.log"].latest().map(|e| e.path.as_str()),
            Some("/var/log/a.log")
        );
    }

    #[test]
    fn directory_summary_groups_root_files() {
        let entries = vec![
            entry("/var/log/syslog", 1),
            entry("/var/log/auth.log", 1),
            entry("/var/log/nginx/access.log", 1),
            entry("/var/log/nginx/error.log", 1),
            entry("/opt/app/logs/app.log", 1),
        ];
        let summary = directory_summary(&entries, "/var/log/");
        assert_eq!(summary[ROOT_DIRECTORY_KEY], 2);
        assert_eq!(summary["nginx"], 2);
        assert_eq!(summary["/opt/app/logs"], 1);
    }
}
