//! Scripted in-memory transport for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use logiq_core::{LogiqError, LogiqResult};

use super::{CommandOutput, ConnectTarget, Connector, Handshake, RemoteExec};
use crate::secret::Secret;

#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    /// Never answers; the per-call timeout fires.
    Hang,
    /// The channel is gone.
    Closed,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self::Output(CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_status: Some(0),
        })
    }

    pub fn fail(status: u32, stderr: &str) -> Self {
        Self::Output(CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_status: Some(status),
        })
    }

    pub fn mixed(stdout: &str, stderr: &str, status: u32) -> Self {
        Self::Output(CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_status: Some(status),
        })
    }
}

/// Replies are chosen by the first rule whose pattern is contained in the
/// command. Unmatched commands exit 127.
pub struct MockTransport {
    host: String,
    rules: Mutex<Vec<(String, Reply)>>,
    log: Mutex<Vec<(String, Option<Vec<u8>>)>>,
    closed: AtomicBool,
    closes: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            host: "mock:22".to_string(),
            rules: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn on(self: &Arc<Self>, pattern: &str, reply: Reply) -> Arc<Self> {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), reply));
        Arc::clone(self)
    }

    /// Commands executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Stdin supplied to the first command containing `pattern`.
    pub fn input_for(&self, pattern: &str) -> Option<Vec<u8>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.contains(pattern))
            .and_then(|(_, input)| input.clone())
    }

    /// Every `close` call, including repeats.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    async fn reply(
        &self,
        command: &str,
        input: Option<&[u8]>,
        timeout: Duration,
    ) -> LogiqResult<CommandOutput> {
        if self.is_closed() {
            return Err(LogiqError::ChannelClosed("session closed".into()));
        }
        self.log
            .lock()
            .unwrap()
            .push((command.to_string(), input.map(<[u8]>::to_vec)));

        let reply = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::fail(127, "sh: command not found"));

        match reply {
            Reply::Output(out) => Ok(out),
            Reply::Closed => Err(LogiqError::ChannelClosed("connection reset".into())),
            Reply::Hang => {
                let _ = tokio::time::timeout(timeout, std::future::pending::<()>()).await;
                Err(LogiqError::ExecutionTimeout {
                    command: command.to_string(),
                    after: timeout,
                })
            }
        }
    }
}

#[async_trait]
impl RemoteExec for MockTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, command: &str, timeout: Duration) -> LogiqResult<CommandOutput> {
        self.reply(command, None, timeout).await
    }

    async fn execute_with_input(
        &self,
        command: &str,
        input: &[u8],
        timeout: Duration,
    ) -> LogiqResult<CommandOutput> {
        self.reply(command, Some(input), timeout).await
    }

    async fn close(&self) -> LogiqResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out one shared [`MockTransport`], or a scripted failure.
pub struct MockConnector {
    transport: Arc<MockTransport>,
    connect_error: Mutex<Option<LogiqError>>,
    password: Option<String>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            connect_error: Mutex::new(None),
            password: None,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn failing(transport: Arc<MockTransport>, err: LogiqError) -> Self {
        let connector = Self::new(transport);
        *connector.connect_error.lock().unwrap() = Some(err);
        connector
    }

    /// Only this password authenticates.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }
}

struct MockHandshake {
    transport: Arc<MockTransport>,
    password: Option<String>,
}

#[async_trait]
impl Handshake for MockHandshake {
    async fn authenticate(
        self: Box<Self>,
        username: &str,
        secret: &Secret,
        _timeout: Duration,
    ) -> LogiqResult<Arc<dyn RemoteExec>> {
        if let Some(expected) = &self.password {
            if secret.expose() != expected {
                return Err(LogiqError::Auth(format!("password rejected for {username}")));
            }
        }
        Ok(self.transport as Arc<dyn RemoteExec>)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _target: &ConnectTarget,
        _timeout: Duration,
    ) -> LogiqResult<Box<dyn Handshake>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.connect_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(Box::new(MockHandshake {
            transport: Arc::clone(&self.transport),
            password: self.password.clone(),
        }))
    }
}
