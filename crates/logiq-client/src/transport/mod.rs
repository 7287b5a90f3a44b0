//! Remote command transport.
//!
//! A [`Connector`] establishes a connection ([`Handshake`]) which is then
//! authenticated into a [`RemoteExec`] session. Sessions are shared as
//! `Arc<dyn RemoteExec>` between the coordinator, the scanner and the
//! session manager.

pub mod ssh;

#[cfg(test)]
pub(crate) mod mock;

pub use ssh::{SshConnector, SshOptions, SshSession};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logiq_core::{LogiqError, LogiqResult};
use serde::{Deserialize, Serialize};

use crate::secret::Secret;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the server closed the channel without reporting a status.
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Stdout followed by stderr, as a probe sees it.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// An authenticated session able to run remote commands.
///
/// Every call is timeboxed independently. `close` is idempotent.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// `host:port` this session is connected to.
    fn host(&self) -> &str;

    async fn execute(&self, command: &str, timeout: Duration) -> LogiqResult<CommandOutput>;

    /// Run `command` with `input` written to its stdin, followed by EOF.
    async fn execute_with_input(
        &self,
        command: &str,
        input: &[u8],
        timeout: Duration,
    ) -> LogiqResult<CommandOutput>;

    async fn close(&self) -> LogiqResult<()>;

    fn is_closed(&self) -> bool;
}

/// A connected but not yet authenticated session.
#[async_trait]
pub trait Handshake: Send {
    async fn authenticate(
        self: Box<Self>,
        username: &str,
        secret: &Secret,
        timeout: Duration,
    ) -> LogiqResult<Arc<dyn RemoteExec>>;
}

/// Opens sessions to remote hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish the transport and verify the host identity.
    async fn connect(
        &self,
        target: &ConnectTarget,
        timeout: Duration,
    ) -> LogiqResult<Box<dyn Handshake>>;

    /// Connect and authenticate in one step.
    async fn open(
        &self,
        target: &ConnectTarget,
        secret: &Secret,
        timeout: Duration,
    ) -> LogiqResult<Arc<dyn RemoteExec>> {
        let handshake = self.connect(target, timeout).await?;
        handshake
            .authenticate(&target.username, secret, timeout)
            .await
    }
}

/// Where to connect, parsed from `[user@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTarget {
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl ConnectTarget {
    pub fn new(username: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            host: host.into(),
            port,
        }
    }

    /// Parse `[user@]host[:port]`. IPv6 literals must be bracketed when a port
    /// is given (`[::1]:2222`).
    pub fn parse(target: &str, default_user: &str) -> LogiqResult<Self> {
        let (user, rest) = match target.rsplit_once('@') {
            Some((user, rest)) => {
                if user.is_empty() {
                    return Err(LogiqError::Config(format!(
                        "empty username in target '{target}'"
                    )));
                }
                (user, rest)
            }
            None => (default_user, target),
        };

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            let (host, after) = stripped.split_once(']').ok_or_else(|| {
                LogiqError::Config(format!("unterminated IPv6 literal in '{target}'"))
            })?;
            let port = match after.strip_prefix(':') {
                Some(p) => parse_port(p, target)?,
                None if after.is_empty() => DEFAULT_SSH_PORT,
                None => {
                    return Err(LogiqError::Config(format!("invalid target '{target}'")));
                }
            };
            (host, port)
        } else {
            match rest.split_once(':') {
                Some((host, p)) if !p.contains(':') => (host, parse_port(p, target)?),
                // bare IPv6 literal without a port
                Some(_) => (rest, DEFAULT_SSH_PORT),
                None => (rest, DEFAULT_SSH_PORT),
            }
        };

        if host.is_empty() {
            return Err(LogiqError::Config(format!("empty host in target '{target}'")));
        }
        if user.is_empty() {
            return Err(LogiqError::Config(format!("no username for target '{target}'")));
        }

        Ok(Self::new(user, host, port))
    }

    /// `host:port`, as used for socket addresses and known-hosts keys.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.address())
    }
}

fn parse_port(raw: &str, target: &str) -> LogiqResult<u16> {
    raw.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| LogiqError::Config(format!("invalid port '{raw}' in target '{target}'")))
}

/// The current system username, used when a target omits one.
pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}
