//! logiq-core: domain library for remote log diagnostics.
//!
//! Provides the probe catalog, flavor matching, elevation classification,
//! log family grouping and filtering, session lifecycle states, progress
//! events and history records. Nothing here touches the network.

pub mod catalog;
pub mod diagnose;
pub mod elevation;
pub mod error;
pub mod events;
pub mod filter;
pub mod flavor;
pub mod history;
pub mod inventory;
pub mod lifecycle;

// Re-export commonly used items at crate root.
pub use catalog::ProbeCatalog;
pub use diagnose::{Diagnosis, DiagnosisCategory};
pub use elevation::{Elevation, ElevationResult};
pub use error::{ErrorKind, LogiqError, LogiqResult};
pub use events::{EventStage, FailureDetail, ProgressEvent};
pub use filter::{filter, filtered_view, group, LogFamily, DEFAULT_KEEP_LATEST};
pub use flavor::{Classification, ExpectedOutput, FlavorProbe, FlavorTag, MatchMode};
pub use history::{HistoryRecord, Outcome, Transition};
pub use inventory::{family_name, LogEntry};
pub use lifecycle::{SessionState, StateMachine};
