//! logiq-client: async side of the logiq diagnostic core.
//!
//! Opens SSH sessions to remote hosts, negotiates elevation, detects the
//! host flavor from a probe catalog and inventories its log files, while
//! reporting progress as an ordered event stream.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use logiq_client::{
//!     ConnectTarget, CoordinatorConfig, SessionCoordinator, SessionManager, SshConnector,
//!     StaticSecret,
//! };
//! use logiq_core::ProbeCatalog;
//!
//! # async fn example() -> logiq_core::LogiqResult<()> {
//! let coordinator = SessionCoordinator::new(
//!     Arc::new(SshConnector::default()),
//!     Arc::new(ProbeCatalog::builtin()),
//!     CoordinatorConfig::default(),
//! );
//! let manager = SessionManager::new(coordinator);
//!
//! let target = ConnectTarget::parse("admin@10.0.0.5", "admin")?;
//! let (id, mut events) = manager.connect(target, Arc::new(StaticSecret::new("pw"))).await;
//! while let Some(event) = events.recv().await {
//!     println!("[{}] {}", event.stage, event.message);
//! }
//!
//! for (family, entries) in manager.list_log_families(&id).await? {
//!     println!("{family}: {} older versions", entries.len());
//! }
//! manager.disconnect(&id).await?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod coordinator;
pub mod history;
pub mod known_hosts;
pub mod manager;
pub mod privilege;
pub mod scanner;
pub mod secret;
pub mod tail;
pub mod transport;

pub use classifier::FlavorClassifier;
pub use coordinator::{CoordinatorConfig, Inventory, ReadySession, SessionCoordinator};
pub use history::{HistorySink, JsonlHistorySink, NullHistorySink};
pub use known_hosts::{HostKeyPolicy, HostStatus, KnownHosts};
pub use manager::SessionManager;
pub use privilege::{negotiate, Elevator};
pub use scanner::{LogScanner, ScanItem, ScanReport, ScanWalk, ScanWarning};
pub use secret::{Secret, SecretSource, StaticSecret};
pub use tail::{tail, DEFAULT_TAIL_LINES};
pub use transport::ssh::{SshConnector, SshOptions, SshSession};
pub use transport::{CommandOutput, ConnectTarget, Connector, RemoteExec, DEFAULT_SSH_PORT};

pub use logiq_core::{LogiqError, LogiqResult};
