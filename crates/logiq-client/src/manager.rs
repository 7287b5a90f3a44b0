//! Session registry behind the external interface.
//!
//! Tracks every connection attempt by id, from the running coordinator task
//! through `Ready` or `Failed` to removal on disconnect or acknowledgement.
//! Sessions share nothing but the coordinator's read-only configuration.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use logiq_core::{
    Classification, FailureDetail, LogEntry, LogiqError, LogiqResult, ProgressEvent,
    StateMachine,
};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{Inventory, ReadySession, SessionCoordinator};
use crate::privilege::Elevator;
use crate::secret::SecretSource;
use crate::transport::{ConnectTarget, RemoteExec};

enum Slot {
    Running {
        cancel: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    Ready(Box<ReadySession>),
    Failed(StateMachine),
}

impl Slot {
    fn label(&self) -> &'static str {
        match self {
            Slot::Running { .. } => "still connecting",
            Slot::Ready(_) => "ready",
            Slot::Failed(_) => "failed",
        }
    }
}

type Slots = Arc<RwLock<HashMap<String, Slot>>>;

/// Runs sessions in parallel and answers queries about them by id.
pub struct SessionManager {
    coordinator: Arc<SessionCoordinator>,
    sessions: Slots,
}

impl SessionManager {
    pub fn new(coordinator: SessionCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    /// Start a session. The returned stream ends after `complete` or
    /// `failed`; by the time that event arrives the session can be queried.
    pub async fn connect(
        &self,
        target: ConnectTarget,
        secrets: Arc<dyn SecretSource>,
    ) -> (String, mpsc::UnboundedReceiver<ProgressEvent>) {
        let id = generate_session_id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Hold the lock until the slot exists so the task cannot finish first.
        let mut sessions = self.sessions.write().await;
        let task = tokio::spawn(drive_session(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.sessions),
            id.clone(),
            target,
            secrets,
            events_tx,
            cancel_rx,
        ));
        sessions.insert(
            id.clone(),
            Slot::Running {
                cancel: cancel_tx,
                task,
            },
        );
        info!(session_id = %id, "session started");

        (id, events_rx)
    }

    /// Detected flavor of a ready session.
    pub async fn current_flavor(&self, id: &str) -> LogiqResult<Classification> {
        let sessions = self.sessions.read().await;
        let ready = ready_slot(&sessions, id)?;
        Ok(ready.classification.clone())
    }

    /// Every log family with its newest entries hidden.
    pub async fn list_log_families(&self, id: &str) -> LogiqResult<BTreeMap<String, Vec<LogEntry>>> {
        let keep_latest = self.coordinator.config().keep_latest;
        let sessions = self.sessions.read().await;
        let ready = ready_slot(&sessions, id)?;
        Ok(ready.inventory.filtered(keep_latest))
    }

    /// Full inventory of a ready session, warnings included.
    pub async fn inventory(&self, id: &str) -> LogiqResult<Inventory> {
        let sessions = self.sessions.read().await;
        let ready = ready_slot(&sessions, id)?;
        Ok(ready.inventory.clone())
    }

    /// Last `lines` lines of a remote file on a ready session.
    pub async fn tail(&self, id: &str, path: &str, lines: usize) -> LogiqResult<String> {
        let (session, elevator): (Arc<dyn RemoteExec>, Elevator) = {
            let sessions = self.sessions.read().await;
            let ready = ready_slot(&sessions, id)?;
            (Arc::clone(&ready.session), ready.elevator.clone())
        };
        let timeout = self.coordinator.config().command_timeout;
        crate::tail::tail(session.as_ref(), &elevator, path, lines, timeout).await
    }

    /// End a session in any state. A running session is cancelled and its
    /// task awaited, so the transport is closed when this returns.
    pub async fn disconnect(&self, id: &str) -> LogiqResult<()> {
        let slot = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| LogiqError::SessionNotFound(id.to_string()))?;

        match slot {
            Slot::Running { cancel, task } => {
                debug!(session_id = %id, "cancelling running session");
                let _ = cancel.send(true);
                if let Err(e) = task.await {
                    warn!(session_id = %id, error = %e, "session task ended abnormally");
                }
            }
            Slot::Ready(mut ready) => ready.disconnect().await?,
            Slot::Failed(mut machine) => machine.acknowledge()?,
        }

        info!(session_id = %id, "session disconnected");
        Ok(())
    }

    /// Take the failure of a failed session and forget it.
    pub async fn acknowledge(&self, id: &str) -> LogiqResult<FailureDetail> {
        let mut sessions = self.sessions.write().await;
        let machine = match sessions.get_mut(id) {
            Some(Slot::Failed(machine)) => machine,
            Some(other) => {
                return Err(LogiqError::InvalidState(format!(
                    "session {id} is {}, nothing to acknowledge",
                    other.label()
                )))
            }
            None => return Err(LogiqError::SessionNotFound(id.to_string())),
        };

        let detail = machine
            .failure()
            .cloned()
            .ok_or_else(|| LogiqError::InvalidState(format!("session {id} has no failure")))?;
        machine.acknowledge()?;
        sessions.remove(id);
        Ok(detail)
    }

    /// Number of tracked sessions, in any state.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn ready_slot<'a>(sessions: &'a HashMap<String, Slot>, id: &str) -> LogiqResult<&'a ReadySession> {
    match sessions.get(id) {
        Some(Slot::Ready(ready)) => Ok(&**ready),
        Some(other) => Err(LogiqError::InvalidState(format!(
            "session {id} is {}",
            other.label()
        ))),
        None => Err(LogiqError::SessionNotFound(id.to_string())),
    }
}

/// Run one coordinator and publish its outcome into the slot.
///
/// Terminal events are held back until the slot is updated.
async fn drive_session(
    coordinator: Arc<SessionCoordinator>,
    sessions: Slots,
    id: String,
    target: ConnectTarget,
    secrets: Arc<dyn SecretSource>,
    events: mpsc::UnboundedSender<ProgressEvent>,
    cancel: watch::Receiver<bool>,
) {
    let (inner_tx, mut inner_rx) = mpsc::unbounded_channel();
    let run = coordinator.run(&id, &target, secrets.as_ref(), inner_tx, cancel);
    tokio::pin!(run);

    let mut held = Vec::new();
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            Some(event) = inner_rx.recv() => {
                if event.is_terminal() || !held.is_empty() {
                    held.push(event);
                } else {
                    let _ = events.send(event);
                }
            }
        }
    };
    while let Ok(event) = inner_rx.try_recv() {
        held.push(event);
    }

    let orphan = {
        let mut slots = sessions.write().await;
        match slots.get_mut(&id) {
            Some(slot) if matches!(slot, Slot::Running { .. }) => {
                *slot = match result {
                    Ok(ready) => Slot::Ready(Box::new(ready)),
                    Err(detail) => {
                        let mut machine = StateMachine::new();
                        if let Err(e) = machine.fail(detail) {
                            warn!(session_id = %id, error = %e, "failed to record failure");
                        }
                        Slot::Failed(machine)
                    }
                };
                None
            }
            // Disconnected while running.
            _ => result.ok(),
        }
    };

    if let Some(mut ready) = orphan {
        if let Err(e) = ready.disconnect().await {
            warn!(session_id = %id, error = %e, "failed to close orphaned session");
        }
    }

    for event in held {
        let _ = events.send(event);
    }
}

/// Random session id (16 bytes, hex-encoded).
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}
