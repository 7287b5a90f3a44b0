//! `logiq tail [user@]host path [-n N]`: print the end of a remote log.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{ensure_complete, follow, parse_target, Runtime};
use crate::config::Config;
use crate::prompt;

pub async fn run(
    cfg: &Config,
    target: &str,
    path: &str,
    lines: usize,
    separate_admin: bool,
) -> Result<()> {
    if !path.starts_with('/') {
        anyhow::bail!("remote path must be absolute: {path}");
    }

    let target = parse_target(target, cfg)?;
    let secrets = prompt::secrets_for(&target, separate_admin)?;
    info!(target = %target, path = %path, lines, "tail");

    let runtime = Runtime::start(cfg)?;
    let (id, events) = runtime.manager.connect(target, Arc::new(secrets)).await;

    let outcome = match ensure_complete(follow(events, true).await) {
        Ok(()) => runtime
            .manager
            .tail(&id, path, lines)
            .await
            .with_context(|| format!("failed to read {path}")),
        Err(e) => Err(e),
    };

    if let Err(e) = runtime.manager.disconnect(&id).await {
        warn!(session_id = %id, error = %e, "disconnect failed");
    }
    runtime.shutdown().await;

    let text = outcome?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
