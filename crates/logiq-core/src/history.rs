//! Connection history records handed to an external sink.

use crate::error::ErrorKind;
use crate::lifecycle::SessionState;
use serde::{Deserialize, Serialize};

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A state the session entered, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub state: SessionState,
    pub at_ms: u64,
}

/// How the session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Ready,
    Failed {
        stage: SessionState,
        kind: ErrorKind,
        message: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub session_id: String,
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    pub transitions: Vec<Transition>,
    pub outcome: Outcome,
}

impl HistoryRecord {
    /// Wall time between the first and last transition.
    pub fn duration_ms(&self) -> u64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => last.at_ms.saturating_sub(first.at_ms),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_outcome_tag() {
        let record = HistoryRecord {
            session_id: "abc".into(),
            host: "10.0.0.1:22".into(),
            username: "admin".into(),
            flavor: None,
            transitions: vec![
                Transition {
                    state: SessionState::Connecting,
                    at_ms: 1_000,
                },
                Transition {
                    state: SessionState::Failed,
                    at_ms: 1_250,
                },
            ],
            outcome: Outcome::Failed {
                stage: SessionState::Connecting,
                kind: ErrorKind::NetworkError,
                message: "refused".into(),
            },
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"]["outcome"], "failed");
        assert_eq!(json["outcome"]["stage"], "connecting");
        assert!(json.get("flavor").is_none());
        assert_eq!(record.duration_ms(), 250);
    }

    #[test]
    fn clock_is_after_epoch() {
        assert!(now_millis() > 0);
    }
}
