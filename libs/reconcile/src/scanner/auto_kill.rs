//! Auto-kill scanner: kills every descriptor observed in `Running`.
//!
//! A successful kill moves the descriptor to `Killed` immediately rather
//! than waiting for the next status pass. The application handle is left
//! in place; the next successful deploy replaces it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Scanner, ScannerCore};
use crate::config::ScannerSettings;
use crate::descriptor::Descriptor;
use crate::network::Network;
use crate::state::ApplicationState;

pub struct AutoKillScanner {
    core: ScannerCore,
}

impl AutoKillScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            core: ScannerCore::new(settings),
        }
    }
}

impl Default for AutoKillScanner {
    fn default() -> Self {
        Self::new(ScannerSettings::auto_kill())
    }
}

#[async_trait]
impl Scanner for AutoKillScanner {
    fn name(&self) -> &'static str {
        "auto-kill"
    }

    fn core(&self) -> &ScannerCore {
        &self.core
    }

    async fn check(&self, _network: &Network, descriptor: &Arc<Descriptor>) -> anyhow::Result<()> {
        if descriptor.state() != ApplicationState::Running {
            return Ok(());
        }

        match descriptor.manager().kill(descriptor).await {
            Ok(()) => {
                info!(
                    descriptor_id = %descriptor.id(),
                    host = descriptor.host().address(),
                    "Killed application"
                );
                descriptor.set_state(ApplicationState::Killed);
            }
            Err(e) => {
                warn!(
                    descriptor_id = %descriptor.id(),
                    host = descriptor.host().address(),
                    error = %e,
                    "Kill failed, will retry next cycle"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::mock::{MockHost, MockManager};

    #[tokio::test]
    async fn test_kills_running_descriptor() {
        let manager = Arc::new(MockManager::new());
        let descriptor = Descriptor::shared(Arc::new(MockHost::new("node-1")), manager.clone());
        descriptor.set_state(ApplicationState::Running);

        AutoKillScanner::default()
            .check(&Network::new("kill-test"), &descriptor)
            .await
            .unwrap();

        assert_eq!(manager.kill_calls(), 1);
        assert_eq!(descriptor.state(), ApplicationState::Killed);
    }

    #[tokio::test]
    async fn test_failed_kill_leaves_state() {
        let manager = Arc::new(MockManager::failing_kill());
        let descriptor = Descriptor::shared(Arc::new(MockHost::new("node-1")), manager.clone());
        descriptor.set_state(ApplicationState::Running);

        AutoKillScanner::default()
            .check(&Network::new("kill-test"), &descriptor)
            .await
            .unwrap();

        assert_eq!(manager.kill_calls(), 1);
        assert_eq!(descriptor.state(), ApplicationState::Running);
    }

    #[tokio::test]
    async fn test_ignores_non_running() {
        let manager = Arc::new(MockManager::new());
        let descriptor = Descriptor::shared(Arc::new(MockHost::new("node-1")), manager.clone());
        descriptor.set_state(ApplicationState::Auth);

        AutoKillScanner::default()
            .check(&Network::new("kill-test"), &descriptor)
            .await
            .unwrap();

        assert_eq!(manager.kill_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_in_flight_finishes_after_disable() {
        let manager = Arc::new(MockManager::new());
        manager.set_action_delay(Duration::from_secs(5));
        let descriptor = Descriptor::shared(Arc::new(MockHost::new("node-1")), manager.clone());
        descriptor.set_state(ApplicationState::Running);

        let network = Network::new("kill-test");
        network.add(Arc::clone(&descriptor));
        let scanner: Arc<dyn Scanner> = Arc::new(AutoKillScanner::default());
        scanner.set_enabled(true);

        let cycle = tokio::spawn({
            let network = network.clone();
            let scanner = Arc::clone(&scanner);
            async move { network.scan(&scanner).await }
        });
        while manager.kill_calls() == 0 {
            tokio::task::yield_now().await;
        }

        scanner.set_enabled(false);
        let report = cycle.await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(descriptor.state(), ApplicationState::Killed);

        // The next cycle sees the scanner disabled.
        descriptor.set_state(ApplicationState::Running);
        let report = network.scan(&scanner).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(manager.kill_calls(), 1);
    }
}
