//! Log entries, family-name derivation and remote listing parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A single log file found during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Absolute path on the remote host.
    pub path: String,
    /// Path with version/date/sequence suffixes stripped.
    pub family: String,
    /// Modification time in unix milliseconds.
    pub modified: i64,
    /// Size in bytes.
    pub size: u64,
}

impl LogEntry {
    pub fn new(path: impl Into<String>, modified: i64, size: u64) -> Self {
        let path = path.into();
        let family = family_name(&path);
        Self {
            path,
            family,
            modified,
            size,
        }
    }

    /// The file name component of the path.
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }

    /// The directory component of the path (`/` for top-level files).
    pub fn directory(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn suffix_regex() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        // date stamps (20240101, 2024-01-01, optional time), then plain sequence numbers
        Regex::new(
            r"[._-](?:\d{4}-?\d{2}-?\d{2}(?:[T_-]?\d{2}:?\d{2}(?::?\d{2})?)?|\d+)$",
        )
        .expect("suffix regex compiles")
    })
}

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ansi regex compiles")
    })
}

/// Canonical family name: the path with trailing rotation, date and sequence
/// suffixes stripped from its file name.
///
/// `/var/log/app.log.3` and `/var/log/app.log.2024-01-01` both map to
/// `/var/log/app.log`. The directory part is kept, so identically named logs
/// in different directories are different families.
pub fn family_name(path: &str) -> String {
    let name = file_name(path);
    let dir = &path[..path.len() - name.len()];

    let mut base = name;
    while let Some(m) = suffix_regex().find(base) {
        if m.start() == 0 {
            break;
        }
        base = &base[..m.start()];
    }

    format!("{dir}{base}")
}

/// Whether a file name ends with the archive suffix.
pub fn is_archive(name: &str, suffix: &str) -> bool {
    name.ends_with(suffix)
}

/// Remove ANSI escape sequences from remote output.
pub fn strip_ansi(text: &str) -> String {
    ansi_regex().replace_all(text, "").into_owned()
}

/// Kind of a listed directory member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    File,
    Directory,
}

/// One line of remote directory listing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    pub kind: ListingKind,
    pub path: String,
    pub modified: i64,
    pub size: u64,
}

/// Parse `find -printf '%y\t%T@\t%s\t%p\n'` output, one member per line as
/// `type<TAB>mtime<TAB>size<TAB>path`. Unparseable lines are skipped.
pub fn parse_listing(output: &str) -> Vec<ListingRecord> {
    output.lines().filter_map(parse_listing_line).collect()
}

fn parse_listing_line(line: &str) -> Option<ListingRecord> {
    let mut parts = line.splitn(4, '\t');
    let kind = match parts.next()?.trim() {
        "f" => ListingKind::File,
        "d" => ListingKind::Directory,
        _ => return None,
    };
    let modified = parse_mtime(parts.next()?)?;
    let size = parts.next()?.trim().parse().ok()?;
    let path = parts.next()?.trim_end_matches('\r');
    if !path.starts_with('/') {
        return None;
    }

    Some(ListingRecord {
        kind,
        path: path.to_string(),
        modified,
        size,
    })
}

/// `%T@` prints seconds with a fractional part; keep millisecond precision.
fn parse_mtime(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (secs, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let secs: i64 = secs.parse().ok()?;
    let millis = frac
        .chars()
        .chain(std::iter::repeat('0'))
        .take(3)
        .collect::<String>()
        .parse::<i64>()
        .ok()?;
    Some(secs * 1000 + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_strips_numeric_rotation() {
        assert_eq!(family_name("/var/log/app.log.1"), "/var/log/app.log");
        assert_eq!(family_name("/var/log/app.log.42"), "/var/log/app.log");
        assert_eq!(family_name("/var/log/syslog.1"), "/var/log/syslog");
    }

    #[test]
    fn family_strips_date_stamps() {
        assert_eq!(
            family_name("/var/log/application.log.2024-11-11"),
            "/var/log/application.log"
        );
        assert_eq!(family_name("/var/log/messages-20240101"), "/var/log/messages");
        assert_eq!(
            family_name("/var/log/app/app_2024-01-01T10:00:00"),
            "/var/log/app/app"
        );
    }

    #[test]
    fn family_strips_stacked_suffixes() {
        assert_eq!(family_name("/var/log/foo.log.20240101.1"), "/var/log/foo.log");
    }

    #[test]
    fn family_keeps_plain_names() {
        assert_eq!(family_name("/var/log/access.log"), "/var/log/access.log");
        assert_eq!(family_name("/var/log/file_5.log"), "/var/log/file_5.log");
        assert_eq!(family_name("/var/log/sa/sa12"), "/var/log/sa/sa12");
    }

    #[test]
    fn family_never_empties_a_name() {
        assert_eq!(family_name("/var/log/.1"), "/var/log/.1");
        assert_eq!(family_name("/var/log/20240101"), "/var/log/20240101");
    }

    #[test]
    fn family_is_per_directory() {
        assert_ne!(
            family_name("/var/log/nginx/access.log.1"),
            family_name("/var/log/apache2/access.log.1")
        );
    }

    #[test]
    fn archive_detection() {
        assert!(is_archive("syslog.1.gz", ".gz"));
        assert!(!is_archive("test.gz.log", ".gz"));
        assert!(!is_archive("application.log.gz.old", ".gz"));
    }

    #[test]
    fn parse_listing_lines() {
        let output = "f\t1700000000.1234567890\t2048\t/var/log/syslog\n\
                      d\t1700000001.5\t4096\t/var/log/nginx\n\
                      garbage line\n\
                      l\t1700000002.0\t10\t/var/log/link\n";
        let records = parse_listing(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ListingKind::File);
        assert_eq!(records[0].modified, 1_700_000_000_123);
        assert_eq!(records[0].size, 2048);
        assert_eq!(records[1].kind, ListingKind::Directory);
        assert_eq!(records[1].modified, 1_700_000_001_500);
        assert_eq!(records[1].path, "/var/log/nginx");
    }

    #[test]
    fn parse_listing_keeps_spaces_in_paths() {
        let records = parse_listing("f\t1\t0\t/var/log/my app.log\n");
        assert_eq!(records[0].path, "/var/log/my app.log");
        assert_eq!(records[0].modified, 1000);
    }

    #[test]
    fn strips_ansi_sequences() {
        assert_eq!(strip_ansi("\x1b[31merror\x1b[0m line"), "error line");
    }

    #[test]
    fn entry_accessors() {
        let entry = LogEntry::new("/var/log/nginx/error.log.2", 0, 10);
        assert_eq!(entry.file_name(), "error.log.2");
        assert_eq!(entry.directory(), "/var/log/nginx");
        assert_eq!(entry.family, "/var/log/nginx/error.log");
        assert_eq!(LogEntry::new("/syslog", 0, 0).directory(), "/");
    }
}
