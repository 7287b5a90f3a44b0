use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors produced while talking to a remote host.
#[derive(Debug, Error)]
pub enum LogiqError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("command `{command}` timed out after {after:?}")]
    ExecutionTimeout { command: String, after: Duration },

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("host key rejected: {0}")]
    HostKey(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Serializable error category, attached to failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthError,
    NetworkError,
    TimeoutError,
    ExecutionTimeout,
    ChannelClosed,
    PermissionDenied,
    FileNotFound,
    HostKey,
    SessionNotFound,
    InvalidState,
    Config,
    Cancelled,
    Other,
}

impl LogiqError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::AuthError,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
            Self::ExecutionTimeout { .. } => ErrorKind::ExecutionTimeout,
            Self::ChannelClosed(_) => ErrorKind::ChannelClosed,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::HostKey(_) => ErrorKind::HostKey,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Config(_) => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) => ErrorKind::NetworkError,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether a caller may retry with a fresh session.
    ///
    /// Authentication and host-key failures are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkError | ErrorKind::TimeoutError
        )
    }
}

impl From<toml::de::Error> for LogiqError {
    fn from(e: toml::de::Error) -> Self {
        LogiqError::Config(e.to_string())
    }
}

impl From<regex::Error> for LogiqError {
    fn from(e: regex::Error) -> Self {
        LogiqError::Config(e.to_string())
    }
}

pub type LogiqResult<T> = Result<T, LogiqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(LogiqError::Auth("bad".into()).kind(), ErrorKind::AuthError);
        assert_eq!(
            LogiqError::ExecutionTimeout {
                command: "find /var/log".into(),
                after: Duration::from_secs(5),
            }
            .kind(),
            ErrorKind::ExecutionTimeout
        );
        assert_eq!(LogiqError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn only_network_and_timeout_are_transient() {
        assert!(LogiqError::Network("refused".into()).is_transient());
        assert!(LogiqError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(!LogiqError::Auth("bad password".into()).is_transient());
        assert!(!LogiqError::HostKey("changed".into()).is_transient());
        assert!(!LogiqError::PermissionDenied("/root".into()).is_transient());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ExecutionTimeout).unwrap();
        assert_eq!(json, "\"execution_timeout\"");
    }
}
