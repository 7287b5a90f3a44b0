//! SSH transport built on russh.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use logiq_core::{LogiqError, LogiqResult};
use russh::client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CommandOutput, ConnectTarget, Connector, Handshake, RemoteExec};
use crate::known_hosts::{HostKeyPolicy, KnownHosts};
use crate::secret::Secret;

/// SSH client settings shared by every connection.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host_key_policy: HostKeyPolicy,
    /// Trust store used by `accept-new` and `strict`.
    pub known_hosts: Option<KnownHosts>,
    pub keepalive_interval: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// Opens russh client sessions with password authentication.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

struct SshHandler {
    host: String,
    policy: HostKeyPolicy,
    known_hosts: Option<KnownHosts>,
    /// Why the host key was refused, surfaced instead of russh's generic error.
    rejection: Arc<StdMutex<Option<String>>>,
}

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        debug!(host = %self.host, fingerprint = %fingerprint, "server host key");

        let verdict = match &self.known_hosts {
            Some(store) => self.policy.check(store, &self.host, &fingerprint),
            None => {
                warn!(host = %self.host, "no trust store configured, accepting host key");
                Ok(())
            }
        };

        match verdict {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(host = %self.host, error = %e, "host key rejected");
                if let Ok(mut slot) = self.rejection.lock() {
                    *slot = Some(e.to_string());
                }
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
        timeout: Duration,
    ) -> LogiqResult<Box<dyn Handshake>> {
        let addr = target.address();
        info!(addr = %addr, policy = %self.options.host_key_policy, "connecting via SSH");

        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(self.options.keepalive_interval),
            keepalive_max: 3,
            ..Default::default()
        });

        let rejection = Arc::new(StdMutex::new(None));
        let handler = SshHandler {
            host: addr.clone(),
            policy: self.options.host_key_policy,
            known_hosts: self.options.known_hosts.clone(),
            rejection: Arc::clone(&rejection),
        };

        let connected = tokio::time::timeout(timeout, client::connect(config, addr.as_str(), handler))
            .await
            .map_err(|_| LogiqError::Timeout(timeout))?;

        let handle = match connected {
            Ok(handle) => handle,
            Err(e) => {
                let refused = rejection.lock().ok().and_then(|mut slot| slot.take());
                return Err(match (refused, e) {
                    (Some(reason), _) => LogiqError::HostKey(reason),
                    (None, russh::Error::UnknownKey) => {
                        LogiqError::HostKey(format!("host key for {addr} not accepted"))
                    }
                    (None, other) => LogiqError::Network(other.to_string()),
                });
            }
        };

        debug!(addr = %addr, "SSH transport established");
        Ok(Box::new(SshHandshake { addr, handle }))
    }
}

struct SshHandshake {
    addr: String,
    handle: client::Handle<SshHandler>,
}

#[async_trait]
impl Handshake for SshHandshake {
    async fn authenticate(
        self: Box<Self>,
        username: &str,
        secret: &Secret,
        timeout: Duration,
    ) -> LogiqResult<Arc<dyn RemoteExec>> {
        let SshHandshake { addr, mut handle } = *self;

        let accepted = tokio::time::timeout(
            timeout,
            handle.authenticate_password(username, secret.expose()),
        )
        .await
        .map_err(|_| LogiqError::Timeout(timeout))?
        .map_err(|e| LogiqError::Network(format!("SSH authentication exchange failed: {e}")))?;

        if !accepted {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
            return Err(LogiqError::Auth(format!(
                "password rejected for {username}@{addr}"
            )));
        }

        info!(addr = %addr, user = %username, "SSH authentication successful");
        Ok(Arc::new(SshSession {
            addr,
            handle: Mutex::new(Some(Arc::new(handle))),
            closed: AtomicBool::new(false),
        }))
    }
}

/// An authenticated russh session. Each command runs on its own channel.
pub struct SshSession {
    addr: String,
    handle: Mutex<Option<Arc<client::Handle<SshHandler>>>>,
    closed: AtomicBool,
}

impl SshSession {
    async fn run(
        &self,
        command: &str,
        input: Option<&[u8]>,
        timeout: Duration,
    ) -> LogiqResult<CommandOutput> {
        let handle = self
            .handle
            .lock()
            .await
            .clone()
            .ok_or_else(|| LogiqError::ChannelClosed(format!("session to {} is closed", self.addr)))?;

        debug!(addr = %self.addr, command = %command, "exec");

        tokio::time::timeout(timeout, run_on_channel(&handle, command, input))
            .await
            .map_err(|_| LogiqError::ExecutionTimeout {
                command: command.to_string(),
                after: timeout,
            })?
    }
}

async fn run_on_channel(
    handle: &client::Handle<SshHandler>,
    command: &str,
    input: Option<&[u8]>,
) -> LogiqResult<CommandOutput> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| LogiqError::ChannelClosed(format!("failed to open channel: {e}")))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| LogiqError::ChannelClosed(format!("failed to execute command: {e}")))?;

    if let Some(input) = input {
        channel
            .data(input)
            .await
            .map_err(|e| LogiqError::ChannelClosed(format!("failed to write stdin: {e}")))?;
        channel
            .eof()
            .await
            .map_err(|e| LogiqError::ChannelClosed(format!("failed to close stdin: {e}")))?;
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    loop {
        match channel.wait().await {
            Some(russh::ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
            Some(russh::ChannelMsg::ExtendedData { data, ext: 1 }) => {
                stderr.extend_from_slice(&data)
            }
            Some(russh::ChannelMsg::ExitStatus { exit_status: code }) => {
                exit_status = Some(code);
            }
            Some(russh::ChannelMsg::Close) | None => break,
            _ => {}
        }
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
    })
}

#[async_trait]
impl RemoteExec for SshSession {
    fn host(&self) -> &str {
        &self.addr
    }

    async fn execute(&self, command: &str, timeout: Duration) -> LogiqResult<CommandOutput> {
        self.run(command, None, timeout).await
    }

    async fn execute_with_input(
        &self,
        command: &str,
        input: &[u8],
        timeout: Duration,
    ) -> LogiqResult<CommandOutput> {
        self.run(command, Some(input), timeout).await
    }

    async fn close(&self) -> LogiqResult<()> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        self.closed.store(true, Ordering::SeqCst);

        if let Err(e) = handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
        {
            debug!(addr = %self.addr, error = %e, "disconnect after close");
        }
        info!(addr = %self.addr, "SSH session closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
