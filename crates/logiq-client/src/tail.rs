//! Reading the end of a remote log file.

use std::time::Duration;

use logiq_core::inventory::strip_ansi;
use logiq_core::{LogiqError, LogiqResult};
use tracing::debug;

use crate::privilege::Elevator;
use crate::transport::RemoteExec;

pub const DEFAULT_TAIL_LINES: usize = 250;

/// Last `lines` lines of `path`, with ANSI escapes removed.
pub async fn tail(
    session: &dyn RemoteExec,
    elevator: &Elevator,
    path: &str,
    lines: usize,
    timeout: Duration,
) -> LogiqResult<String> {
    if !path.starts_with('/') {
        return Err(LogiqError::FileNotFound(format!(
            "{path} (path must be absolute)"
        )));
    }

    let command = format!("tail -n {lines} {}", shell_escape::unix::escape(path.into()));
    let output = elevator.run(session, &command, timeout).await?;
    debug!(host = %session.host(), path = %path, status = ?output.exit_status, "tail");

    if output.success() {
        return Ok(strip_ansi(&output.stdout));
    }

    let stderr = output.stderr.to_lowercase();
    if stderr.contains("no such file or directory") {
        Err(LogiqError::FileNotFound(path.to_string()))
    } else if stderr.contains("permission denied") || stderr.contains("password is required") {
        Err(LogiqError::PermissionDenied(path.to_string()))
    } else {
        Err(LogiqError::Other(format!(
            "tail {path} failed: {}",
            output.stderr.trim()
        )))
    }
}
