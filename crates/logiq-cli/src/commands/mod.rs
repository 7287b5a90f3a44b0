//! CLI subcommand implementations.

pub mod bulk;
pub mod inspect;
pub mod known_hosts;
pub mod probes;
pub mod tail;

use std::sync::Arc;

use anyhow::{Context, Result};
use logiq_client::{
    ConnectTarget, HistorySink, JsonlHistorySink, SessionCoordinator, SessionManager,
    SshConnector, SshOptions,
};
use logiq_core::{EventStage, ProgressEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;

/// A session manager wired from the config, plus the history writer to
/// flush on shutdown.
pub struct Runtime {
    pub manager: SessionManager,
    history: Option<JoinHandle<()>>,
}

impl Runtime {
    pub fn start(cfg: &Config) -> Result<Self> {
        let catalog = Arc::new(cfg.catalog()?);
        let known_hosts = cfg.known_hosts()?;
        info!(
            policy = %cfg.ssh.host_key_policy,
            known_hosts = %known_hosts.path().display(),
            "host key policy"
        );

        let connector = SshConnector::new(SshOptions {
            host_key_policy: cfg.ssh.host_key_policy,
            known_hosts: Some(known_hosts),
            ..Default::default()
        });
        let mut coordinator =
            SessionCoordinator::new(Arc::new(connector), catalog, cfg.coordinator_config());

        let mut history = None;
        if let Some(path) = &cfg.scan.history {
            debug!(path = %path.display(), "recording connection history");
            let (sink, writer) = JsonlHistorySink::spawn(path);
            coordinator = coordinator.with_history(Arc::new(sink) as Arc<dyn HistorySink>);
            history = Some(writer);
        }

        Ok(Self {
            manager: SessionManager::new(coordinator),
            history,
        })
    }

    /// Drop every session handle and wait for queued history records.
    pub async fn shutdown(self) {
        drop(self.manager);
        if let Some(writer) = self.history {
            let _ = writer.await;
        }
    }
}

pub fn parse_target(target: &str, cfg: &Config) -> Result<ConnectTarget> {
    ConnectTarget::parse(target, &cfg.default_user())
        .with_context(|| format!("invalid target '{target}'"))
}

/// Drain a session's progress stream, echoing it to stderr unless `quiet`.
/// Returns the terminal event.
pub async fn follow(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    quiet: bool,
) -> Option<ProgressEvent> {
    let mut last = None;
    while let Some(event) = events.recv().await {
        if !quiet {
            print_event(&event);
        }
        last = Some(event);
    }
    last
}

fn print_event(event: &ProgressEvent) {
    eprintln!("[{}] {}", event.stage, event.message);
    if event.stage != EventStage::Failed {
        return;
    }
    let Some(detail) = &event.error else {
        return;
    };
    if let Some(raw) = &detail.raw_output {
        eprintln!("  remote output: {}", raw.trim());
    }
    if let Some(diagnosis) = &detail.diagnosis {
        eprintln!("  {}: {}", diagnosis.title, diagnosis.summary);
        for suggestion in &diagnosis.suggestions {
            eprintln!("    - {suggestion}");
        }
    }
}

/// Turn a terminal `failed` event into an error for the caller.
pub fn ensure_complete(last: Option<ProgressEvent>) -> Result<()> {
    match last {
        Some(event) if event.stage == EventStage::Complete => Ok(()),
        Some(event) => match event.error {
            Some(detail) => anyhow::bail!(
                "session failed while {} ({:?}): {}",
                detail.stage,
                detail.kind,
                detail.message
            ),
            None => anyhow::bail!("session ended unexpectedly: {}", event.message),
        },
        None => anyhow::bail!("session produced no events"),
    }
}
