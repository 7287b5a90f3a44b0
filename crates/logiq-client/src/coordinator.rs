//! The session coordinator: connect, authenticate, detect the flavor,
//! negotiate elevation and scan logs, emitting progress along the way.
//!
//! One run drives one [`StateMachine`]. Progress events are sent in
//! production order on an unbounded channel which closes after the terminal
//! `complete` or `failed` event. Cancellation is observed between remote
//! commands; the transport is closed exactly once whenever the run fails.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use logiq_core::filter::{directory_summary, filtered_view, group};
use logiq_core::history::now_millis;
use logiq_core::{
    Classification, ElevationResult, EventStage, FailureDetail, HistoryRecord, LogEntry,
    LogFamily, LogiqError, LogiqResult, Outcome, ProbeCatalog, ProgressEvent, SessionState,
    StateMachine, Transition, DEFAULT_KEEP_LATEST,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::classifier::FlavorClassifier;
use crate::history::{HistorySink, NullHistorySink};
use crate::privilege::{self, Elevator};
use crate::scanner::{LogScanner, ScanItem, ScanReport, ScanWarning};
use crate::secret::{resolve_admin_secret, SecretSource};
use crate::transport::{ConnectTarget, Connector, RemoteExec};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub connect_timeout: Duration,
    /// Bound on every remote command unless a probe overrides it.
    pub command_timeout: Duration,
    pub keep_latest: usize,
    /// Fail the session when no elevation is possible.
    pub require_elevation: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            keep_latest: DEFAULT_KEEP_LATEST,
            require_elevation: false,
        }
    }
}

/// Log files found on a host, grouped into families.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub roots: Vec<String>,
    pub entries: Vec<LogEntry>,
    pub families: BTreeMap<String, LogFamily>,
    pub warnings: Vec<ScanWarning>,
}

impl Inventory {
    pub fn from_report(roots: Vec<String>, report: ScanReport) -> Self {
        let families = group(report.entries.iter().cloned());
        Self {
            roots,
            entries: report.entries,
            families,
            warnings: report.warnings,
        }
    }

    /// Each family minus its `keep_latest` newest entries.
    pub fn filtered(&self, keep_latest: usize) -> BTreeMap<String, Vec<LogEntry>> {
        filtered_view(&self.families, keep_latest)
    }

    /// File counts per directory, relative to the first root.
    pub fn directory_summary(&self) -> BTreeMap<String, usize> {
        let root = self.roots.first().map(String::as_str).unwrap_or("/");
        directory_summary(&self.entries, root)
    }
}

/// A session that reached `Ready`.
pub struct ReadySession {
    pub id: String,
    pub target: ConnectTarget,
    pub session: Arc<dyn RemoteExec>,
    pub classification: Classification,
    pub elevation: ElevationResult,
    pub elevator: Elevator,
    pub inventory: Inventory,
    pub machine: StateMachine,
}

impl ReadySession {
    /// Close the transport and move to `Disconnected`.
    pub async fn disconnect(&mut self) -> LogiqResult<()> {
        self.machine.advance(SessionState::Disconnected)?;
        self.session.close().await
    }
}

impl std::fmt::Debug for ReadySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadySession")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("classification", &self.classification)
            .field("state", &self.machine.state())
            .finish()
    }
}

pub struct SessionCoordinator {
    connector: Arc<dyn Connector>,
    catalog: Arc<ProbeCatalog>,
    config: CoordinatorConfig,
    history: Arc<dyn HistorySink>,
}

/// A stage failure and the remote output that explains it, if any.
struct StageError {
    error: LogiqError,
    raw_output: Option<String>,
}

impl StageError {
    fn with_raw(error: LogiqError, raw_output: impl Into<String>) -> Self {
        Self {
            error,
            raw_output: Some(raw_output.into()),
        }
    }
}

impl From<LogiqError> for StageError {
    fn from(error: LogiqError) -> Self {
        Self {
            error,
            raw_output: None,
        }
    }
}

/// Mutable state of one run.
struct Run {
    id: String,
    target: ConnectTarget,
    machine: StateMachine,
    transitions: Vec<Transition>,
    events: mpsc::UnboundedSender<ProgressEvent>,
    cancel: watch::Receiver<bool>,
    session: Option<Arc<dyn RemoteExec>>,
    flavor: Option<String>,
}

impl Run {
    fn enter(&mut self, state: SessionState, message: impl Into<String>) -> LogiqResult<()> {
        self.machine.advance(state)?;
        self.transitions.push(Transition {
            state,
            at_ms: now_millis(),
        });
        let message = message.into();
        info!(session_id = %self.id, state = %state, "{message}");
        if let Some(stage) = state.event_stage() {
            self.emit(ProgressEvent::new(stage, message));
        }
        Ok(())
    }

    fn emit(&self, event: ProgressEvent) {
        if self.events.send(event).is_err() {
            debug!(session_id = %self.id, "progress receiver dropped");
        }
    }

    /// Close the transport if this run opened one. Runs at most once.
    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(session_id = %self.id, error = %e, "failed to close session");
            }
        }
    }

    fn record(&self, outcome: Outcome) -> HistoryRecord {
        HistoryRecord {
            session_id: self.id.clone(),
            host: self.target.address(),
            username: self.target.username.clone(),
            flavor: self.flavor.clone(),
            transitions: self.transitions.clone(),
            outcome,
        }
    }
}

/// Resolves once cancellation is requested. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let sender_gone = cancel.wait_for(|c| *c).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

async fn guarded<T>(
    cancel: &mut watch::Receiver<bool>,
    work: impl Future<Output = LogiqResult<T>>,
) -> LogiqResult<T> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(LogiqError::Cancelled),
        result = work => result,
    }
}

impl SessionCoordinator {
    pub fn new(
        connector: Arc<dyn Connector>,
        catalog: Arc<ProbeCatalog>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            connector,
            catalog,
            config,
            history: Arc::new(NullHistorySink),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ProbeCatalog {
        &self.catalog
    }

    /// Bring one session from `Idle` to `Ready`, or to `Failed`.
    ///
    /// `events` receives every progress event; it is dropped when this
    /// returns, so the stream ends right after the terminal event.
    pub async fn run(
        &self,
        session_id: &str,
        target: &ConnectTarget,
        secrets: &dyn SecretSource,
        events: mpsc::UnboundedSender<ProgressEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Result<ReadySession, FailureDetail> {
        let mut run = Run {
            id: session_id.to_string(),
            target: target.clone(),
            machine: StateMachine::new(),
            transitions: Vec::new(),
            events,
            cancel,
            session: None,
            flavor: None,
        };

        match self.drive(&mut run, secrets).await {
            Ok(ready) => Ok(ready),
            Err(err) => Err(self.fail(&mut run, err).await),
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        secrets: &dyn SecretSource,
    ) -> Result<ReadySession, StageError> {
        let target = run.target.clone();
        let cfg = &self.config;

        run.enter(
            SessionState::Connecting,
            format!("connecting to {}", target.address()),
        )?;
        let login = secrets.ssh_secret(&target)?;
        let handshake = guarded(
            &mut run.cancel,
            self.connector.connect(&target, cfg.connect_timeout),
        )
        .await?;

        run.enter(
            SessionState::Authenticating,
            format!("authenticating as {}", target.username),
        )?;
        let session = guarded(
            &mut run.cancel,
            handshake.authenticate(&target.username, &login, cfg.connect_timeout),
        )
        .await?;
        run.session = Some(Arc::clone(&session));

        run.enter(SessionState::DetectingFlavor, "detecting host flavor")?;
        let admin = resolve_admin_secret(secrets, &target, &login)?;
        let classifier = FlavorClassifier::new(Arc::clone(&self.catalog), cfg.command_timeout);
        let probe_elevator = Elevator::optimistic(Some(admin.clone()));
        let classification = guarded(
            &mut run.cancel,
            classifier.classify(session.as_ref(), &probe_elevator),
        )
        .await?;
        run.flavor = classification.tag().map(ToString::to_string);

        run.enter(
            SessionState::Elevating,
            format!("flavor {classification}, negotiating elevation"),
        )?;
        let elevation = guarded(
            &mut run.cancel,
            privilege::negotiate(session.as_ref(), cfg.command_timeout),
        )
        .await?;
        let elevator = Elevator::from_result(&elevation, Some(admin));

        if elevation.requires_secret() && !elevator.is_elevated() {
            if cfg.require_elevation {
                return Err(StageError::with_raw(
                    LogiqError::PermissionDenied(
                        "sudo requires a password and no admin secret was supplied".to_string(),
                    ),
                    elevation.raw_output.clone(),
                ));
            }
            warn!(session_id = %run.id, "no admin secret for sudo, continuing unprivileged");
        } else if elevation.requires_secret() {
            if let Err(e) = guarded(
                &mut run.cancel,
                elevator.verify(session.as_ref(), cfg.command_timeout),
            )
            .await
            {
                return Err(StageError::with_raw(e, elevation.raw_output.clone()));
            }
        } else if !elevation.available() {
            if cfg.require_elevation {
                let reason = match &elevation.elevation {
                    logiq_core::Elevation::Unavailable { reason } => reason.clone(),
                    _ => "elevation unavailable".to_string(),
                };
                return Err(StageError::with_raw(
                    LogiqError::PermissionDenied(reason),
                    elevation.raw_output.clone(),
                ));
            }
            warn!(session_id = %run.id, "elevation unavailable, continuing unprivileged");
        }

        let roots = self.catalog.roots_for(&classification).to_vec();
        run.enter(
            SessionState::ScanningLogs,
            format!("scanning {}", roots.join(", ")),
        )?;
        let scanner =
            LogScanner::new(&self.catalog, cfg.command_timeout).with_elevator(elevator.clone());
        let mut walk = scanner.walk(Arc::clone(&session), &roots);
        let mut report = ScanReport::default();

        loop {
            let item = guarded(&mut run.cancel, async {
                Ok::<_, LogiqError>(walk.next().await)
            })
            .await?;
            match item {
                None => break,
                Some(Ok(ScanItem::Entry(entry))) => report.entries.push(entry),
                Some(Ok(ScanItem::Warning(warning))) => {
                    run.emit(ProgressEvent::new(
                        EventStage::Scanning,
                        format!("skipped {}: {}", warning.path, warning.message),
                    ));
                    report.warnings.push(warning);
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }

        run.emit(ProgressEvent::new(
            EventStage::Filtering,
            format!(
                "grouping {} files, hiding the {} newest per family",
                report.entries.len(),
                cfg.keep_latest
            ),
        ));
        let inventory = Inventory::from_report(roots, report);

        run.enter(
            SessionState::Ready,
            format!(
                "{} log files in {} families",
                inventory.entries.len(),
                inventory.families.len()
            ),
        )?;
        self.history.submit(run.record(Outcome::Ready));

        Ok(ReadySession {
            id: run.id.clone(),
            target,
            session,
            classification,
            elevation,
            elevator,
            inventory,
            machine: run.machine.clone(),
        })
    }

    async fn fail(&self, run: &mut Run, err: StageError) -> FailureDetail {
        let stage = run.machine.state();
        let mut detail = FailureDetail::from_error(stage, &err.error);
        if let Some(raw) = err.raw_output {
            detail = detail.with_raw_output(raw);
        }
        warn!(session_id = %run.id, stage = %stage, error = %err.error, "session failed");

        if let Err(e) = run.machine.fail(detail.clone()) {
            warn!(session_id = %run.id, error = %e, "failure from unexpected state");
        }
        run.transitions.push(Transition {
            state: SessionState::Failed,
            at_ms: now_millis(),
        });

        run.teardown().await;
        run.emit(ProgressEvent::failed(detail.clone()));

        let outcome = match err.error {
            LogiqError::Cancelled => Outcome::Cancelled,
            _ => Outcome::Failed {
                stage,
                kind: detail.kind,
                message: detail.message.clone(),
            },
        };
        self.history.submit(run.record(outcome));
        detail
    }
}
