//! Privilege negotiation and the elevation wrapper.

use std::time::Duration;

use logiq_core::elevation::{secret_rejected, Elevation, ElevationResult, ELEVATION_PROBE};
use logiq_core::{LogiqError, LogiqResult};
use tracing::{debug, info, warn};

use crate::secret::Secret;
use crate::transport::{CommandOutput, RemoteExec};

/// Run the elevation probe and classify its output.
///
/// Transport failures (timeouts, closed channels) propagate; everything the
/// probe prints is left to [`ElevationResult::classify`].
pub async fn negotiate(session: &dyn RemoteExec, timeout: Duration) -> LogiqResult<ElevationResult> {
    let output = session.execute(ELEVATION_PROBE, timeout).await?;
    let result = ElevationResult::classify(&output.combined());
    info!(host = %session.host(), elevation = ?result.elevation, "privilege negotiation finished");
    Ok(result)
}

#[derive(Clone)]
enum Mode {
    /// Commands run as the login user.
    Plain,
    /// `sudo -n`: succeeds only where no password is needed.
    NonInteractive,
    /// `sudo -S` with the secret on stdin.
    WithSecret(Secret),
}

/// Wraps remote commands so they run elevated.
#[derive(Clone)]
pub struct Elevator {
    mode: Mode,
}

impl std::fmt::Debug for Elevator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.mode {
            Mode::Plain => "plain",
            Mode::NonInteractive => "sudo -n",
            Mode::WithSecret(_) => "sudo -S",
        };
        f.debug_struct("Elevator").field("mode", &mode).finish()
    }
}

impl Elevator {
    /// No elevation.
    pub fn none() -> Self {
        Self { mode: Mode::Plain }
    }

    /// Elevation attempted before negotiation, for probes flagged as
    /// elevated: feed the secret when one is known, otherwise never prompt.
    pub fn optimistic(secret: Option<Secret>) -> Self {
        let mode = match secret {
            Some(secret) if !secret.is_empty() => Mode::WithSecret(secret),
            _ => Mode::NonInteractive,
        };
        Self { mode }
    }

    /// Elevator matching a negotiated result.
    pub fn from_result(result: &ElevationResult, secret: Option<Secret>) -> Self {
        let mode = match (&result.elevation, secret) {
            (Elevation::Passwordless, _) => Mode::NonInteractive,
            (Elevation::RequiresSecret, Some(secret)) if !secret.is_empty() => {
                Mode::WithSecret(secret)
            }
            _ => Mode::Plain,
        };
        Self { mode }
    }

    pub fn is_elevated(&self) -> bool {
        !matches!(self.mode, Mode::Plain)
    }

    /// The command to send and the stdin to feed it.
    pub fn wrap(&self, command: &str) -> (String, Option<Vec<u8>>) {
        let quoted = shell_escape::unix::escape(command.into());
        match &self.mode {
            Mode::Plain => (command.to_string(), None),
            Mode::NonInteractive => (format!("sudo -n sh -c {quoted}"), None),
            Mode::WithSecret(secret) => (
                format!("sudo -S -p '' sh -c {quoted}"),
                Some(secret.as_stdin_line()),
            ),
        }
    }

    /// Run `command` through [`Elevator::wrap`].
    pub async fn run(
        &self,
        session: &dyn RemoteExec,
        command: &str,
        timeout: Duration,
    ) -> LogiqResult<CommandOutput> {
        match self.wrap(command) {
            (wrapped, Some(input)) => session.execute_with_input(&wrapped, &input, timeout).await,
            (wrapped, None) => session.execute(&wrapped, timeout).await,
        }
    }

    /// Confirm the secret actually grants elevation.
    ///
    /// A rejected or ineffective secret is `PermissionDenied`; the raw sudo
    /// output is included in the message.
    pub async fn verify(&self, session: &dyn RemoteExec, timeout: Duration) -> LogiqResult<()> {
        if !matches!(self.mode, Mode::WithSecret(_)) {
            return Ok(());
        }

        let output = self.run(session, "id", timeout).await?;
        let combined = output.combined();
        debug!(host = %session.host(), status = ?output.exit_status, "elevation verification");

        if combined.contains("uid=0(") {
            return Ok(());
        }

        warn!(host = %session.host(), "admin secret did not grant elevation");
        let reason = if secret_rejected(&combined) {
            "admin password rejected"
        } else {
            "elevated identity not reached"
        };
        Err(LogiqError::PermissionDenied(format!(
            "{reason}: {}",
            combined.trim()
        )))
    }
}
