//! Wiring of one managed application: network, descriptors and scanners.

use std::sync::Arc;

use drover_reconcile::{
    ApplicationManager, AutoDeployScanner, AutoKillScanner, AutoRemoveScanner, Descriptor, Host,
    Network, Scanner, StatusScanner,
};
use tracing::{info, warn};

use crate::command_manager::CommandManager;
use crate::config::{Config, ScannerKind};
use crate::local_host::LocalHost;
use crate::report::attach_reporter;

/// A network with its four scanners.
///
/// Deploy and kill wait on the status scanner so they act on states
/// classified in the same round.
pub struct Fleet {
    network: Network,
    status: Arc<StatusScanner>,
    deploy: Arc<AutoDeployScanner>,
    kill: Arc<AutoKillScanner>,
    remove: Arc<AutoRemoveScanner>,
    manager: Arc<dyn ApplicationManager>,
}

impl Fleet {
    /// Build the fleet described by `config` with [`LocalHost`] instances
    /// managed by a [`CommandManager`]. Nothing runs until [`Fleet::start`].
    pub fn from_config(config: &Config) -> Self {
        let manager: Arc<dyn ApplicationManager> =
            Arc::new(CommandManager::new(config.launch_command.clone()));
        let fleet = Self::with_manager(config, manager);
        for _ in 0..config.instances {
            fleet.add_instance(Arc::new(LocalHost::new()));
        }
        fleet
    }

    /// An empty fleet; instances are added with [`Fleet::add_instance`].
    pub fn with_manager(config: &Config, manager: Arc<dyn ApplicationManager>) -> Self {
        let status = Arc::new(
            StatusScanner::new(config.status.clone()).with_host_probe_timeout(config.host_probe_timeout),
        );
        let deploy = Arc::new(AutoDeployScanner::new(config.deploy.clone()));
        let kill = Arc::new(AutoKillScanner::new(config.kill.clone()));
        let remove = Arc::new(AutoRemoveScanner::new(config.remove.clone()));

        deploy.sync_with(status.as_ref());
        kill.sync_with(status.as_ref());

        status.set_enabled(config.scanner_enabled(ScannerKind::Status));
        deploy.set_enabled(config.scanner_enabled(ScannerKind::Deploy));
        kill.set_enabled(config.scanner_enabled(ScannerKind::Kill));
        remove.set_enabled(config.scanner_enabled(ScannerKind::Remove));

        Self {
            network: Network::new(config.application.clone()),
            status,
            deploy,
            kill,
            remove,
            manager,
        }
    }

    /// Add one instance on `host`, reporting its state changes.
    pub fn add_instance(&self, host: Arc<dyn Host>) -> Arc<Descriptor> {
        let descriptor = Descriptor::shared(host, Arc::clone(&self.manager));
        attach_reporter(self.network.id(), &descriptor);
        if !self.network.add(Arc::clone(&descriptor)) {
            warn!(descriptor_id = %descriptor.id(), "Instance not added to network");
        }
        descriptor
    }

    /// Attach every scanner to the network. Must be called inside a tokio
    /// runtime.
    pub fn start(&self) {
        let scanners: [Arc<dyn Scanner>; 4] = [
            self.status.clone(),
            self.deploy.clone(),
            self.kill.clone(),
            self.remove.clone(),
        ];
        for scanner in scanners {
            let name = scanner.name();
            let enabled = scanner.is_enabled();
            if !self.network.add_scanner(scanner) {
                warn!(scanner = name, "Failed to attach scanner");
                continue;
            }
            info!(scanner = name, enabled, "Scanner scheduled");
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn status_scanner(&self) -> &Arc<StatusScanner> {
        &self.status
    }

    pub fn deploy_scanner(&self) -> &Arc<AutoDeployScanner> {
        &self.deploy
    }

    pub fn kill_scanner(&self) -> &Arc<AutoKillScanner> {
        &self.kill
    }

    pub fn remove_scanner(&self) -> &Arc<AutoRemoveScanner> {
        &self.remove
    }

    /// Stop scanning and release every instance.
    pub async fn shutdown(&self) {
        self.network.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use drover_reconcile::mock::{MockHost, MockManager};
    use drover_reconcile::ApplicationState;

    fn config(scanners: &str) -> Config {
        Config::from_lookup(|key| match key {
            "DROVER_SCANNERS" => Some(scanners.to_string()),
            "DROVER_STATUS_INTERVAL_MS" => Some("100".to_string()),
            "DROVER_DEPLOY_INTERVAL_MS" => Some("100".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_scanners_enabled_from_config() {
        let fleet = Fleet::with_manager(&config("status,kill"), Arc::new(MockManager::new()));
        assert!(fleet.status_scanner().is_enabled());
        assert!(!fleet.deploy_scanner().is_enabled());
        assert!(fleet.kill_scanner().is_enabled());
        assert!(!fleet.remove_scanner().is_enabled());
    }

    #[test]
    fn test_from_config_creates_local_instances() {
        let config = Config::from_lookup(|key| (key == "DROVER_INSTANCES").then(|| "3".to_string())).unwrap();
        let fleet = Fleet::from_config(&config);
        assert_eq!(fleet.network().len(), 3);
        assert!(fleet
            .network()
            .descriptors()
            .iter()
            .all(|d| d.host().is_local() && d.state() == ApplicationState::Unknown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_fleet_deploys_reachable_instance() {
        let manager = Arc::new(MockManager::new());
        let fleet = Fleet::with_manager(&config("status,deploy"), manager.clone());
        let descriptor = fleet.add_instance(Arc::new(MockHost::new("web-1")));

        fleet.start();
        descriptor
            .await_any_of_states_timeout(&[ApplicationState::Launched], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(manager.deploy_calls() >= 1);
        assert!(descriptor.application_handle().is_some());

        fleet.shutdown().await;
        assert!(fleet.network().is_shut_down());
        assert!(fleet.network().scanners().is_empty());
    }
}
