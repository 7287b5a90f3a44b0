//! Flavor detection by running catalog probes in rank order.

use std::sync::Arc;
use std::time::Duration;

use logiq_core::{Classification, FlavorProbe, LogiqError, LogiqResult, ProbeCatalog};
use tracing::{debug, info};

use crate::privilege::Elevator;
use crate::transport::RemoteExec;

pub struct FlavorClassifier {
    catalog: Arc<ProbeCatalog>,
    command_timeout: Duration,
}

impl FlavorClassifier {
    pub fn new(catalog: Arc<ProbeCatalog>, command_timeout: Duration) -> Self {
        Self {
            catalog,
            command_timeout,
        }
    }

    /// First probe, by ascending rank, whose combined output matches wins.
    ///
    /// A probe whose commands fail to run is a non-match. Transport failures
    /// (timeouts, lost channels) abort classification.
    pub async fn classify(
        &self,
        session: &dyn RemoteExec,
        elevator: &Elevator,
    ) -> LogiqResult<Classification> {
        for probe in self.catalog.probes() {
            if self.probe_matches(session, elevator, probe).await? {
                info!(host = %session.host(), flavor = %probe.tag, rank = probe.rank, "flavor detected");
                return Ok(Classification::Matched(probe.tag.clone()));
            }
        }

        info!(host = %session.host(), "no probe matched, flavor unknown");
        Ok(Classification::Unknown)
    }

    async fn probe_matches(
        &self,
        session: &dyn RemoteExec,
        elevator: &Elevator,
        probe: &FlavorProbe,
    ) -> LogiqResult<bool> {
        let timeout = probe
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.command_timeout);

        let mut combined = String::new();
        for command in probe.commands.iter().filter(|c| !c.trim().is_empty()) {
            let result = if probe.elevated {
                elevator.run(session, command, timeout).await
            } else {
                session.execute(command, timeout).await
            };

            match result {
                Ok(output) => {
                    debug!(
                        flavor = %probe.tag,
                        command = %command,
                        status = ?output.exit_status,
                        "probe command finished"
                    );
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str(&output.stdout);
                }
                Err(e @ (LogiqError::ExecutionTimeout { .. } | LogiqError::ChannelClosed(_))) => {
                    return Err(e);
                }
                Err(e) => {
                    debug!(flavor = %probe.tag, command = %command, error = %e, "probe command failed");
                }
            }
        }

        Ok(probe.expect.matches(&combined))
    }
}
