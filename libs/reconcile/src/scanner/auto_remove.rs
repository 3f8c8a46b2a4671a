//! Auto-remove scanner: evicts descriptors that are `Unreachable` or
//! `Invalid`. Pure registry work, no collaborator calls.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Scanner, ScannerCore};
use crate::config::ScannerSettings;
use crate::descriptor::Descriptor;
use crate::network::Network;

pub struct AutoRemoveScanner {
    core: ScannerCore,
}

impl AutoRemoveScanner {
    pub fn new(settings: ScannerSettings) -> Self {
        Self {
            core: ScannerCore::new(settings),
        }
    }
}

impl Default for AutoRemoveScanner {
    fn default() -> Self {
        Self::new(ScannerSettings::auto_remove())
    }
}

#[async_trait]
impl Scanner for AutoRemoveScanner {
    fn name(&self) -> &'static str {
        "auto-remove"
    }

    fn core(&self) -> &ScannerCore {
        &self.core
    }

    async fn check(&self, network: &Network, descriptor: &Arc<Descriptor>) -> anyhow::Result<()> {
        let state = descriptor.state();
        if state.is_lost() && network.remove(descriptor) {
            info!(
                descriptor_id = %descriptor.id(),
                host = descriptor.host().address(),
                %state,
                "Removed lost descriptor from network"
            );
        }
        Ok(())
    }
}
