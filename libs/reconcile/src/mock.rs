//! Mock host and application manager for testing and development.
//!
//! Both mocks are fully scriptable at runtime and count the calls made to
//! them, so tests can assert on what the scanners did.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::descriptor::Descriptor;
use crate::error::{HostError, ManagerError};
use crate::host::{Host, HostProcess, ProcessOutput};
use crate::manager::{ApplicationHandle, ApplicationManager};
use crate::state::ApplicationState;

// =============================================================================
// Host
// =============================================================================

/// How a [`MockHost`] answers `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostBehavior {
    /// Commands succeed immediately.
    Healthy,
    /// `execute` fails with an unresolvable address.
    Unresolvable,
    /// `execute` fails authentication.
    RejectAuth,
    /// `execute` fails with a connection error.
    Unreachable,
    /// Commands start but never finish.
    Hang,
    /// Commands run and exit with this status, like an `ssh` client that
    /// could not connect (255).
    ExitWith(i32),
}

/// Scriptable in-memory host.
#[derive(Debug)]
pub struct MockHost {
    address: String,
    behavior: Mutex<HostBehavior>,
    commands: Mutex<Vec<String>>,
    destroyed: Arc<AtomicUsize>,
    next_pid: AtomicU32,
    closed: AtomicBool,
}

impl MockHost {
    /// A healthy host.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            behavior: Mutex::new(HostBehavior::Healthy),
            commands: Mutex::new(Vec::new()),
            destroyed: Arc::new(AtomicUsize::new(0)),
            next_pid: AtomicU32::new(1000),
            closed: AtomicBool::new(false),
        }
    }

    /// A host with a fixed behavior.
    pub fn with_behavior(address: impl Into<String>, behavior: HostBehavior) -> Self {
        let host = Self::new(address);
        host.set_behavior(behavior);
        host
    }

    pub fn set_behavior(&self, behavior: HostBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Commands passed to `execute`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Processes destroyed before they finished.
    pub fn destroyed_processes(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Host for MockHost {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn execute(&self, command: &str) -> Result<Box<dyn HostProcess>, HostError> {
        if self.is_closed() {
            return Err(HostError::Closed(self.address.clone()));
        }
        self.commands.lock().push(command.to_string());

        let behavior = *self.behavior.lock();
        debug!(host = %self.address, command, ?behavior, "[MOCK] Executing");

        match behavior {
            HostBehavior::Unresolvable => Err(HostError::Unresolvable(self.address.clone())),
            HostBehavior::RejectAuth => Err(HostError::Authentication(self.address.clone())),
            HostBehavior::Unreachable => Err(HostError::Network(format!(
                "connection to {} refused",
                self.address
            ))),
            HostBehavior::Healthy | HostBehavior::Hang | HostBehavior::ExitWith(_) => {
                let status = match behavior {
                    HostBehavior::ExitWith(status) => status,
                    _ => 0,
                };
                Ok(Box::new(MockProcess {
                    pid: self.next_pid.fetch_add(1, Ordering::Relaxed),
                    hang: behavior == HostBehavior::Hang,
                    status,
                    finished: false,
                    destroyed: Arc::clone(&self.destroyed),
                }))
            }
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(host = %self.address, "[MOCK] Host closed");
        }
    }
}

/// Process produced by [`MockHost`].
#[derive(Debug)]
pub struct MockProcess {
    pid: u32,
    hang: bool,
    status: i32,
    finished: bool,
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl HostProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> Result<Option<i32>, HostError> {
        if self.hang && !self.finished {
            Ok(None)
        } else {
            self.finished = true;
            Ok(Some(self.status))
        }
    }

    async fn wait(&mut self) -> Result<ProcessOutput, HostError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.finished = true;
        Ok(ProcessOutput {
            status: Some(self.status),
            stderr: if self.status == 0 {
                String::new()
            } else {
                "ssh: connect to host port 22: Connection refused".to_string()
            },
            ..Default::default()
        })
    }

    async fn destroy(&mut self) {
        if !self.finished {
            self.finished = true;
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Application manager
// =============================================================================

/// How [`MockManager::attempt_application_call`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The application answers.
    Answer,
    /// The application address does not resolve.
    Unresolvable,
    /// Nothing is listening.
    Refused,
    /// An error category the engine does not anticipate.
    Unexpected,
    /// The call never returns.
    Hang,
}

/// Scriptable application manager.
#[derive(Debug)]
pub struct MockManager {
    call_outcome: Mutex<CallOutcome>,
    probe_state: Mutex<Option<ApplicationState>>,
    fail_deploys: AtomicBool,
    fail_kills: AtomicBool,
    action_delay: Mutex<Duration>,
    deploy_calls: AtomicUsize,
    kill_calls: AtomicUsize,
    application_calls: AtomicUsize,
}

impl MockManager {
    /// A manager whose actions succeed and whose application is not answering.
    pub fn new() -> Self {
        Self {
            call_outcome: Mutex::new(CallOutcome::Refused),
            probe_state: Mutex::new(None),
            fail_deploys: AtomicBool::new(false),
            fail_kills: AtomicBool::new(false),
            action_delay: Mutex::new(Duration::ZERO),
            deploy_calls: AtomicUsize::new(0),
            kill_calls: AtomicUsize::new(0),
            application_calls: AtomicUsize::new(0),
        }
    }

    /// A manager whose deploys always fail.
    pub fn failing_deploy() -> Self {
        let manager = Self::new();
        manager.fail_deploys.store(true, Ordering::SeqCst);
        manager
    }

    /// A manager whose kills always fail.
    pub fn failing_kill() -> Self {
        let manager = Self::new();
        manager.fail_kills.store(true, Ordering::SeqCst);
        manager
    }

    /// A manager whose `probe_state` always returns `state`.
    pub fn with_probe_state(state: ApplicationState) -> Self {
        let manager = Self::new();
        *manager.probe_state.lock() = Some(state);
        manager
    }

    pub fn set_call_outcome(&self, outcome: CallOutcome) {
        *self.call_outcome.lock() = outcome;
    }

    pub fn set_fail_deploys(&self, fail: bool) {
        self.fail_deploys.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_kills(&self, fail: bool) {
        self.fail_kills.store(fail, Ordering::SeqCst);
    }

    /// Make deploy and kill take `delay` before answering.
    pub fn set_action_delay(&self, delay: Duration) {
        *self.action_delay.lock() = delay;
    }

    pub fn deploy_calls(&self) -> usize {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }

    pub fn application_calls(&self) -> usize {
        self.application_calls.load(Ordering::SeqCst)
    }

    async fn simulate_delay(&self) {
        let delay = *self.action_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApplicationManager for MockManager {
    async fn deploy(&self, descriptor: &Descriptor) -> Result<ApplicationHandle, ManagerError> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_delay().await;

        if self.fail_deploys.load(Ordering::SeqCst) {
            return Err(ManagerError::Failed("mock manager configured to fail deploys".into()));
        }

        info!(descriptor_id = %descriptor.id(), host = descriptor.host().address(), "[MOCK] Deployed");
        Ok(ApplicationHandle::new())
    }

    async fn kill(&self, descriptor: &Descriptor) -> Result<(), ManagerError> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_delay().await;

        if self.fail_kills.load(Ordering::SeqCst) {
            return Err(ManagerError::Failed("mock manager configured to fail kills".into()));
        }

        info!(descriptor_id = %descriptor.id(), host = descriptor.host().address(), "[MOCK] Killed");
        Ok(())
    }

    async fn attempt_application_call(&self, descriptor: &Descriptor) -> Result<(), ManagerError> {
        self.application_calls.fetch_add(1, Ordering::SeqCst);
        let address = descriptor.host().address().to_string();

        let outcome = *self.call_outcome.lock();
        match outcome {
            CallOutcome::Answer => Ok(()),
            CallOutcome::Unresolvable => Err(ManagerError::Unresolvable(address)),
            CallOutcome::Refused => Err(HostError::Network(format!("{address}: connection refused")).into()),
            CallOutcome::Unexpected => Err(anyhow::anyhow!("mock: unexpected failure").into()),
            CallOutcome::Hang => std::future::pending().await,
        }
    }

    async fn probe_state(&self, descriptor: &Descriptor) -> ApplicationState {
        let scripted = *self.probe_state.lock();
        match scripted {
            Some(state) => state,
            None => match self.attempt_application_call(descriptor).await {
                Ok(()) => ApplicationState::Running,
                Err(_) => ApplicationState::Unreachable,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_host_behaviors() {
        let host = MockHost::new("node-1");
        let mut process = host.execute("cd /").await.unwrap();
        assert!(process.wait().await.unwrap().success());

        host.set_behavior(HostBehavior::RejectAuth);
        assert!(matches!(
            host.execute("cd /").await,
            Err(HostError::Authentication(_))
        ));

        host.close().await;
        assert!(matches!(host.execute("cd /").await, Err(HostError::Closed(_))));
        assert_eq!(host.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_host_hang_can_be_destroyed() {
        let host = MockHost::with_behavior("node-1", HostBehavior::Hang);
        let mut process = host.execute("cd /").await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(20), process.wait()).await;
        assert!(waited.is_err());

        process.destroy().await;
        process.destroy().await;
        assert_eq!(host.destroyed_processes(), 1);
    }

    #[tokio::test]
    async fn test_mock_manager_counts_calls() {
        let manager = Arc::new(MockManager::failing_deploy());
        let descriptor = Descriptor::new(Arc::new(MockHost::new("node-1")), manager.clone());

        assert!(manager.deploy(&descriptor).await.is_err());
        assert!(manager.kill(&descriptor).await.is_ok());
        assert_eq!(manager.deploy_calls(), 1);
        assert_eq!(manager.kill_calls(), 1);
    }
}
