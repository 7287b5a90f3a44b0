//! Session lifecycle states and the transition table.
//!
//! ```text
//! Idle -> Connecting -> Authenticating -> DetectingFlavor -> Elevating
//!      -> ScanningLogs -> Ready -> Disconnected
//! any non-terminal state -> Failed -> (acknowledge) -> Disconnected
//! ```

use crate::error::{LogiqError, LogiqResult};
use crate::events::{EventStage, FailureDetail};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticating,
    DetectingFlavor,
    Elevating,
    ScanningLogs,
    Ready,
    Disconnected,
    Failed,
}

impl SessionState {
    /// The state that legally follows this one on the success path.
    pub fn next(self) -> Option<Self> {
        use SessionState::*;
        match self {
            Idle => Some(Connecting),
            Connecting => Some(Authenticating),
            Authenticating => Some(DetectingFlavor),
            DetectingFlavor => Some(Elevating),
            Elevating => Some(ScanningLogs),
            ScanningLogs => Some(Ready),
            Ready => Some(Disconnected),
            Disconnected | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Progress stage reported when entering this state.
    pub fn event_stage(self) -> Option<EventStage> {
        match self {
            Self::Connecting => Some(EventStage::Connecting),
            Self::Authenticating => Some(EventStage::Authenticating),
            Self::DetectingFlavor => Some(EventStage::DetectingFlavor),
            Self::Elevating => Some(EventStage::Elevating),
            Self::ScanningLogs => Some(EventStage::Scanning),
            Self::Ready => Some(EventStage::Complete),
            Self::Failed => Some(EventStage::Failed),
            Self::Idle | Self::Disconnected => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Authenticating => "Authenticating",
            Self::DetectingFlavor => "DetectingFlavor",
            Self::Elevating => "Elevating",
            Self::ScanningLogs => "ScanningLogs",
            Self::Ready => "Ready",
            Self::Disconnected => "Disconnected",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Enforces the transition table for one session.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    failure: Option<FailureDetail>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Failure detail, present only in `Failed` (and kept after acknowledgement).
    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }

    /// Move to `to`, which must be the successor of the current state.
    pub fn advance(&mut self, to: SessionState) -> LogiqResult<()> {
        if self.state.next() != Some(to) {
            return Err(LogiqError::InvalidState(format!(
                "cannot move from {} to {to}",
                self.state
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Enter `Failed`. The detail's stage is the state the failure happened in.
    pub fn fail(&mut self, detail: FailureDetail) -> LogiqResult<()> {
        if self.state.is_terminal() {
            return Err(LogiqError::InvalidState(format!(
                "cannot fail from terminal state {}",
                self.state
            )));
        }
        self.state = SessionState::Failed;
        self.failure = Some(detail);
        Ok(())
    }

    /// Acknowledge a failure, moving `Failed` to `Disconnected`.
    pub fn acknowledge(&mut self) -> LogiqResult<()> {
        if self.state != SessionState::Failed {
            return Err(LogiqError::InvalidState(format!(
                "nothing to acknowledge in state {}",
                self.state
            )));
        }
        self.state = SessionState::Disconnected;
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(stage: SessionState) -> FailureDetail {
        FailureDetail::from_error(stage, &LogiqError::Network("reset".into()))
    }

    #[test]
    fn success_path_is_sequential() {
        let mut sm = StateMachine::new();
        for to in [
            SessionState::Connecting,
            SessionState::Authenticating,
            SessionState::DetectingFlavor,
            SessionState::Elevating,
            SessionState::ScanningLogs,
            SessionState::Ready,
            SessionState::Disconnected,
        ] {
            sm.advance(to).unwrap();
        }
        assert_eq!(sm.state(), SessionState::Disconnected);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut sm = StateMachine::new();
        sm.advance(SessionState::Connecting).unwrap();
        let err = sm.advance(SessionState::ScanningLogs).unwrap_err();
        assert!(matches!(err, LogiqError::InvalidState(_)));
        assert_eq!(sm.state(), SessionState::Connecting);
    }

    #[test]
    fn idle_cannot_disconnect_directly() {
        let mut sm = StateMachine::new();
        assert!(sm.advance(SessionState::Disconnected).is_err());
    }

    #[test]
    fn failed_is_terminal_until_acknowledged() {
        let mut sm = StateMachine::new();
        sm.advance(SessionState::Connecting).unwrap();
        sm.fail(detail(SessionState::Connecting)).unwrap();

        assert_eq!(sm.state(), SessionState::Failed);
        assert!(sm.advance(SessionState::Authenticating).is_err());
        assert!(sm.fail(detail(SessionState::Failed)).is_err());
        assert_eq!(sm.failure().unwrap().stage, SessionState::Connecting);

        sm.acknowledge().unwrap();
        assert_eq!(sm.state(), SessionState::Disconnected);
        assert!(sm.acknowledge().is_err());
    }

    #[test]
    fn acknowledge_requires_failure() {
        let mut sm = StateMachine::new();
        assert!(sm.acknowledge().is_err());
    }

    #[test]
    fn ready_can_fail() {
        let mut sm = StateMachine::new();
        let mut state = SessionState::Idle;
        while state != SessionState::Ready {
            state = state.next().unwrap();
            sm.advance(state).unwrap();
        }
        assert!(sm.fail(detail(SessionState::Ready)).is_ok());
    }

    #[test]
    fn event_stage_mapping() {
        assert_eq!(
            SessionState::ScanningLogs.event_stage(),
            Some(EventStage::Scanning)
        );
        assert_eq!(SessionState::Ready.event_stage(), Some(EventStage::Complete));
        assert_eq!(SessionState::Idle.event_stage(), None);
    }
}
