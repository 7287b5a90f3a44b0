//! Human-facing diagnostics for connection and session failures.

use crate::error::{ErrorKind, LogiqError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosisCategory {
    DnsError,
    NetworkError,
    TimeoutError,
    AuthError,
    HostKeyError,
    PermissionError,
    SshError,
    Unknown,
}

/// Categorised explanation of an error with next steps for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub category: DiagnosisCategory,
    pub title: String,
    pub summary: String,
    pub suggestions: Vec<String>,
    pub technical_error: String,
}

impl Diagnosis {
    pub fn from_error(err: &LogiqError) -> Self {
        let technical = err.to_string();
        let lower = technical.to_lowercase();

        let category = match err.kind() {
            ErrorKind::AuthError => DiagnosisCategory::AuthError,
            ErrorKind::HostKey => DiagnosisCategory::HostKeyError,
            ErrorKind::PermissionDenied => DiagnosisCategory::PermissionError,
            ErrorKind::TimeoutError | ErrorKind::ExecutionTimeout => {
                DiagnosisCategory::TimeoutError
            }
            ErrorKind::ChannelClosed => DiagnosisCategory::SshError,
            _ => categorize_message(&lower),
        };

        let (title, summary, suggestions): (&str, &str, &[&str]) = match category {
            DiagnosisCategory::DnsError => (
                "DNS resolution failed",
                "The hostname could not be resolved to an address.",
                &[
                    "Verify the hostname spelling",
                    "Try using an IP address instead of the hostname",
                    "Check the DNS server configuration",
                ],
            ),
            DiagnosisCategory::NetworkError => (
                "Network connection failed",
                "The server is not reachable or refused the connection.",
                &[
                    "Verify the server is powered on and running",
                    "Ensure the SSH service is listening on the expected port",
                    "Check firewall rules on both client and server",
                ],
            ),
            DiagnosisCategory::TimeoutError => (
                "Timed out",
                "The server or a remote command did not respond in time.",
                &[
                    "Check whether the server is overloaded or slow to respond",
                    "Verify network connectivity",
                    "Increase the connect or command timeout",
                ],
            ),
            DiagnosisCategory::AuthError => (
                "Authentication failed",
                "The server rejected the supplied credentials.",
                &[
                    "Verify the username and password",
                    "Check that the account is not locked or expired",
                    "Confirm password authentication is enabled on the server",
                ],
            ),
            DiagnosisCategory::HostKeyError => (
                "Host key rejected",
                "The server's host key does not match the trusted record.",
                &[
                    "Confirm the server was reinstalled or its keys were rotated",
                    "Remove the stale entry with `logiq known-hosts remove <host>`",
                ],
            ),
            DiagnosisCategory::PermissionError => (
                "Permission denied",
                "The session lacks the privileges needed for this operation.",
                &[
                    "Verify the admin password",
                    "Check that the user may run sudo on this host",
                ],
            ),
            DiagnosisCategory::SshError => (
                "SSH protocol error",
                "The SSH connection failed during negotiation or was closed.",
                &[
                    "Check the SSH server logs on the remote host",
                    "Verify the server supports current key exchange algorithms",
                ],
            ),
            DiagnosisCategory::Unknown => (
                "Connection error",
                "An unexpected error occurred.",
                &["Check the technical details below", "Retry the operation"],
            ),
        };

        Self {
            category,
            title: title.to_string(),
            summary: summary.to_string(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            technical_error: technical,
        }
    }
}

fn categorize_message(lower: &str) -> DiagnosisCategory {
    if lower.contains("name or service not known")
        || lower.contains("nodename nor servname provided")
        || lower.contains("failed to lookup address")
    {
        DiagnosisCategory::DnsError
    } else if lower.contains("connection refused") || lower.contains("no route to host") {
        DiagnosisCategory::NetworkError
    } else if lower.contains("timed out") || lower.contains("timeout") {
        DiagnosisCategory::TimeoutError
    } else if lower.contains("authentication failed") || lower.contains("permission denied") {
        DiagnosisCategory::AuthError
    } else if lower.contains("ssh") || lower.contains("kex") || lower.contains("protocol") {
        DiagnosisCategory::SshError
    } else {
        DiagnosisCategory::Unknown
    }
}
