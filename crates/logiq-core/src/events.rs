//! Progress events emitted while a session is brought up.

use crate::diagnose::Diagnosis;
use crate::error::{ErrorKind, LogiqError};
use crate::lifecycle::SessionState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage tag carried by every progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventStage {
    Connecting,
    Authenticating,
    DetectingFlavor,
    Elevating,
    Scanning,
    Filtering,
    Complete,
    Failed,
}

impl EventStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for EventStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::DetectingFlavor => "detecting-flavor",
            Self::Elevating => "elevating",
            Self::Scanning => "scanning",
            Self::Filtering => "filtering",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a session failed: the stage it was in, the error kind and whatever
/// remote output was available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub stage: SessionState,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
}

impl FailureDetail {
    pub fn from_error(stage: SessionState, err: &LogiqError) -> Self {
        Self {
            stage,
            kind: err.kind(),
            message: err.to_string(),
            raw_output: None,
            diagnosis: Some(Diagnosis::from_error(err)),
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if !raw.is_empty() {
            self.raw_output = Some(raw);
        }
        self
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

/// One step of session progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: EventStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl ProgressEvent {
    pub fn new(stage: EventStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(detail: FailureDetail) -> Self {
        Self {
            stage: EventStage::Failed,
            message: detail.to_string(),
            error: Some(detail),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stage_serializes_kebab_case() {
        let json = serde_json::to_string(&EventStage::DetectingFlavor).unwrap();
        assert_eq!(json, "\"detecting-flavor\"");
        assert_eq!(EventStage::DetectingFlavor.to_string(), "detecting-flavor");
    }

    #[test]
    fn failed_event_carries_detail() {
        let err = LogiqError::ExecutionTimeout {
            command: "find /var/log".into(),
            after: Duration::from_secs(5),
        };
        let detail =
            FailureDetail::from_error(SessionState::ScanningLogs, &err).with_raw_output("partial");
        let event = ProgressEvent::failed(detail);

        assert!(event.is_terminal());
        let detail = event.error.as_ref().unwrap();
        assert_eq!(detail.stage, SessionState::ScanningLogs);
        assert_eq!(detail.kind, ErrorKind::ExecutionTimeout);
        assert_eq!(detail.raw_output.as_deref(), Some("partial"));
        assert!(detail.diagnosis.is_some());
    }

    #[test]
    fn empty_raw_output_is_dropped() {
        let detail = FailureDetail::from_error(
            SessionState::Connecting,
            &LogiqError::Network("refused".into()),
        )
        .with_raw_output("");
        assert!(detail.raw_output.is_none());
    }

    #[test]
    fn progress_event_json_omits_missing_error() {
        let event = ProgressEvent::new(EventStage::Scanning, "scanning /var/log");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "scanning");
        assert!(json.get("error").is_none());
    }
}
