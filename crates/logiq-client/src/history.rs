//! Connection history sinks.
//!
//! Submission is fire-and-forget: a sink must never block or fail the
//! session that reports to it.

use std::path::{Path, PathBuf};

use logiq_core::HistoryRecord;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub trait HistorySink: Send + Sync {
    fn submit(&self, record: HistoryRecord);
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHistorySink;

impl HistorySink for NullHistorySink {
    fn submit(&self, _record: HistoryRecord) {}
}

/// Appends records as JSON lines from a background writer task.
///
/// The writer ends once every sink handle is dropped; await the returned
/// handle to make sure queued records reached the file.
pub struct JsonlHistorySink {
    tx: mpsc::UnboundedSender<HistoryRecord>,
}

impl JsonlHistorySink {
    pub fn spawn(path: impl Into<PathBuf>) -> (Self, JoinHandle<()>) {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<HistoryRecord>();

        let writer = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match serde_json::to_string(&record) {
                    Ok(mut line) => {
                        line.push('\n');
                        if let Err(e) = append_line(&path, &line).await {
                            error!(path = %path.display(), error = %e, "failed to write history record");
                        }
                    }
                    Err(e) => error!(error = %e, "failed to serialize history record"),
                }
            }
            debug!(path = %path.display(), "history writer finished");
        });

        (Self { tx }, writer)
    }
}

impl HistorySink for JsonlHistorySink {
    fn submit(&self, record: HistoryRecord) {
        if self.tx.send(record).is_err() {
            debug!("history writer gone, record dropped");
        }
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
