//! Auto-deploy scanner: deploys every descriptor observed in `Auth`.
//!
//! A failed deploy leaves the descriptor in `Auth`, so the next cycle tries
//! again. Managers therefore see repeated deploys against an instance that
//! may have partially started.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{CycleReport, Scanner, ScannerCore};
use crate::config::{ScannerSettings, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WINDOW};
use crate::descriptor::Descriptor;
use crate::network::Network;
use crate::retry::RetryTracker;
use crate::state::ApplicationState;

pub struct AutoDeployScanner {
    core: ScannerCore,
    failures: Mutex<RetryTracker>,
}

impl AutoDeployScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            core: ScannerCore::new(settings),
            failures: Mutex::new(RetryTracker::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WINDOW)),
        }
    }

    /// Replace the failure tracker (thresholds for escalated logging).
    pub fn with_retry_tracker(self, tracker: RetryTracker) -> Self {
        *self.failures.lock() = tracker;
        self
    }
}

impl Default for AutoDeployScanner {
    fn default() -> Self {
        Self::new(ScannerSettings::auto_deploy())
    }
}

#[async_trait]
impl Scanner for AutoDeployScanner {
    fn name(&self) -> &'static str {
        "auto-deploy"
    }

    fn core(&self) -> &ScannerCore {
        &self.core
    }

    async fn check(&self, _network: &Network, descriptor: &Arc<Descriptor>) -> anyhow::Result<()> {
        if descriptor.state() != ApplicationState::Auth {
            return Ok(());
        }

        match descriptor.manager().deploy(descriptor).await {
            Ok(handle) => {
                info!(
                    descriptor_id = %descriptor.id(),
                    host = descriptor.host().address(),
                    deployment_id = %handle.id(),
                    "Deployed application"
                );
                descriptor.set_application_handle(handle);
                descriptor.set_state(ApplicationState::Launched);
                self.failures.lock().clear(descriptor.id());
            }
            Err(e) => {
                let (attempts, exhausted) = {
                    let mut failures = self.failures.lock();
                    let attempts = failures.record_failure(descriptor.id());
                    (attempts, failures.is_exhausted(descriptor.id()))
                };

                if exhausted {
                    error!(
                        descriptor_id = %descriptor.id(),
                        host = descriptor.host().address(),
                        attempts,
                        error = %e,
                        "Deploy keeps failing, will retry next cycle"
                    );
                } else {
                    warn!(
                        descriptor_id = %descriptor.id(),
                        host = descriptor.host().address(),
                        attempts,
                        error = %e,
                        "Deploy failed, will retry next cycle"
                    );
                }
            }
        }

        Ok(())
    }

    async fn cycle_finished(&self, _report: &CycleReport) {
        self.failures.lock().prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHost, MockManager};

    fn setup(manager: Arc<MockManager>) -> (Network, Arc<Descriptor>) {
        let network = Network::new("deploy-test");
        let descriptor = Descriptor::shared(Arc::new(MockHost::new("node-1")), manager);
        network.add(Arc::clone(&descriptor));
        (network, descriptor)
    }

    #[tokio::test]
    async fn test_deploys_auth_descriptor() {
        let manager = Arc::new(MockManager::new());
        let (network, descriptor) = setup(manager.clone());
        descriptor.set_state(ApplicationState::Auth);

        AutoDeployScanner::default()
            .check(&network, &descriptor)
            .await
            .unwrap();

        assert_eq!(manager.deploy_calls(), 1);
        assert_eq!(descriptor.state(), ApplicationState::Launched);
        assert!(descriptor.application_handle().is_some());
    }

    #[tokio::test]
    async fn test_ignores_other_states() {
        let manager = Arc::new(MockManager::new());
        let (network, descriptor) = setup(manager.clone());
        let scanner = AutoDeployScanner::default();

        for state in [ApplicationState::Unknown, ApplicationState::Running, ApplicationState::NoAuth] {
            descriptor.set_state(state);
            scanner.check(&network, &descriptor).await.unwrap();
        }

        assert_eq!(manager.deploy_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_deploy_stays_auth_and_retries() {
        let manager = Arc::new(MockManager::failing_deploy());
        let (network, descriptor) = setup(manager.clone());
        descriptor.set_state(ApplicationState::Auth);
        let scanner = AutoDeployScanner::default();

        for _ in 0..5 {
            scanner.check(&network, &descriptor).await.unwrap();
        }

        assert_eq!(manager.deploy_calls(), 5);
        assert_eq!(descriptor.state(), ApplicationState::Auth);
        assert!(descriptor.application_handle().is_none());
        assert!(scanner.failures.lock().is_exhausted(descriptor.id()));
    }

    #[tokio::test]
    async fn test_success_clears_failures() {
        let manager = Arc::new(MockManager::failing_deploy());
        let (network, descriptor) = setup(manager.clone());
        descriptor.set_state(ApplicationState::Auth);
        let scanner = AutoDeployScanner::default();

        scanner.check(&network, &descriptor).await.unwrap();
        assert_eq!(scanner.failures.lock().len(), 1);

        manager.set_fail_deploys(false);
        scanner.check(&network, &descriptor).await.unwrap();
        assert!(scanner.failures.lock().is_empty());
    }
}
