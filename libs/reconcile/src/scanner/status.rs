//! Status scanner: classifies every descriptor by probing it.
//!
//! Per descriptor:
//! 1. Liveness call against the deployed application, bounded by the probe
//!    timeout. Answer → `Running`; unresolvable address → `Invalid`.
//! 2. Otherwise a side-effect-free shell round trip on the host (`cd /`).
//!    Success → `Auth`; authentication failure → `NoAuth`;
//!    unresolvable → `Invalid`; network failure or timeout → `Unreachable`.
//!    A round trip that exits non-zero is an unanticipated failure and maps
//!    to `Unreachable`.
//!
//! Every completed cycle releases the scanner's gate, so dependent scanners
//! can line up behind the most recent full status pass.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error};

use super::{Scanner, ScannerCore};
use crate::config::{ScannerSettings, DEFAULT_HOST_PROBE_TIMEOUT};
use crate::descriptor::Descriptor;
use crate::error::{ErrorKind, HostError};
use crate::host::Host;
use crate::network::Network;
use crate::state::ApplicationState;

/// Shell command used for the host round trip. It has no side effects and
/// does not depend on a working home directory.
pub const HOST_PROBE_COMMAND: &str = "cd /";

pub struct StatusScanner {
    core: ScannerCore,
    host_probe_timeout: Duration,
}

impl StatusScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            core: ScannerCore::new(settings),
            host_probe_timeout: DEFAULT_HOST_PROBE_TIMEOUT,
        }
    }

    /// Bound on the liveness call and on the host round trip. A liveness
    /// call that expires falls through to the host probe; a slower host is
    /// `Unreachable`.
    pub fn with_host_probe_timeout(mut self, timeout: Duration) -> Self {
        self.host_probe_timeout = timeout;
        self
    }

    /// Classify a descriptor without touching its state.
    pub async fn classify(&self, descriptor: &Descriptor) -> ApplicationState {
        let call = descriptor.manager().attempt_application_call(descriptor);
        match tokio::time::timeout(self.host_probe_timeout, call).await {
            Ok(Ok(())) => return ApplicationState::Running,
            Ok(Err(e)) if e.kind() == ErrorKind::Unresolvable => {
                debug!(descriptor_id = %descriptor.id(), error = %e, "Application address unresolvable");
                return ApplicationState::Invalid;
            }
            Ok(Err(e)) => {
                debug!(descriptor_id = %descriptor.id(), error = %e, "Application call failed, probing host");
            }
            Err(_) => {
                debug!(
                    descriptor_id = %descriptor.id(),
                    timeout_ms = self.host_probe_timeout.as_millis() as u64,
                    "Application call timed out, probing host"
                );
            }
        }

        probe_host(descriptor.host().as_ref(), self.host_probe_timeout).await
    }
}

impl Default for StatusScanner {
    fn default() -> Self {
        Self::new(ScannerSettings::status())
    }
}

#[async_trait]
impl Scanner for StatusScanner {
    fn name(&self) -> &'static str {
        "status"
    }

    fn core(&self) -> &ScannerCore {
        &self.core
    }

    async fn check(&self, _network: &Network, descriptor: &Arc<Descriptor>) -> anyhow::Result<()> {
        let state = self.classify(descriptor).await;
        descriptor.set_state(state);
        Ok(())
    }
}

/// Run [`HOST_PROBE_COMMAND`] on `host` within `timeout` and map the
/// outcome to a state. A process still running at the deadline is destroyed.
pub async fn probe_host(host: &dyn Host, timeout: Duration) -> ApplicationState {
    let deadline = Instant::now() + timeout;

    let mut process = match tokio::time::timeout_at(deadline, host.execute(HOST_PROBE_COMMAND)).await {
        Ok(Ok(process)) => process,
        Ok(Err(e)) => return classify_host_error(host, &e),
        Err(_) => {
            debug!(host = host.address(), "Host probe timed out while connecting");
            return ApplicationState::Unreachable;
        }
    };

    match tokio::time::timeout_at(deadline, process.wait()).await {
        Ok(Ok(output)) => match output.into_result() {
            Ok(_) => ApplicationState::Auth,
            // Remote shells report transport failures through the exit
            // status (ssh exits 255), so a failed `cd /` proves nothing.
            Err(e) => classify_host_error(host, &e),
        },
        Ok(Err(e)) => classify_host_error(host, &e),
        Err(_) => {
            debug!(host = host.address(), "Host probe timed out");
            process.destroy().await;
            ApplicationState::Unreachable
        }
    }
}

fn classify_host_error(host: &dyn Host, e: &HostError) -> ApplicationState {
    match e.kind() {
        ErrorKind::Unresolvable => ApplicationState::Invalid,
        ErrorKind::Authentication => ApplicationState::NoAuth,
        ErrorKind::Network | ErrorKind::Timeout => ApplicationState::Unreachable,
        ErrorKind::Other => {
            error!(
                host = host.address(),
                error = %e,
                "Unanticipated host probe failure, treating host as unreachable"
            );
            ApplicationState::Unreachable
        }
    }
}
