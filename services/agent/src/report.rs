//! Structured state-change reports.
//!
//! Every observed transition of a managed descriptor is emitted as one
//! JSON-serializable record through the tracing pipeline.

use chrono::{DateTime, Utc};
use drover_id::{DescriptorId, NetworkId};
use drover_reconcile::{ApplicationState, Descriptor, ObserverId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One observed state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub network_id: NetworkId,
    pub descriptor_id: DescriptorId,
    pub host: String,
    pub from: ApplicationState,
    pub to: ApplicationState,
    pub at: DateTime<Utc>,
}

impl StatusReport {
    /// A report stamped with the current time.
    pub fn new(
        network_id: NetworkId,
        descriptor_id: DescriptorId,
        host: impl Into<String>,
        from: ApplicationState,
        to: ApplicationState,
    ) -> Self {
        Self {
            network_id,
            descriptor_id,
            host: host.into(),
            from,
            to,
            at: Utc::now(),
        }
    }

    /// Lost instances are reported at warn level.
    pub fn emit(&self) {
        let report = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, descriptor_id = %self.descriptor_id, "Failed to serialize status report");
                return;
            }
        };

        if self.to.is_lost() {
            warn!(
                descriptor_id = %self.descriptor_id,
                from = %self.from,
                to = %self.to,
                report = %report,
                "Instance lost"
            );
        } else {
            info!(
                descriptor_id = %self.descriptor_id,
                from = %self.from,
                to = %self.to,
                report = %report,
                "Instance state changed"
            );
        }
    }
}

/// Emit a [`StatusReport`] for every state change of `descriptor`.
pub fn attach_reporter(network_id: NetworkId, descriptor: &Descriptor) -> ObserverId {
    let descriptor_id = descriptor.id();
    let host = descriptor.host().address().to_string();
    descriptor.add_state_change_listener(move |from, to| {
        StatusReport::new(network_id, descriptor_id, host.as_str(), from, to).emit();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use drover_reconcile::mock::{MockHost, MockManager};

    fn descriptor() -> Descriptor {
        Descriptor::new(Arc::new(MockHost::new("db-1")), Arc::new(MockManager::new()))
    }

    #[test]
    fn test_report_serializes_states_in_snake_case() {
        let descriptor = descriptor();
        let report = StatusReport::new(
            NetworkId::new(),
            descriptor.id(),
            descriptor.host().address(),
            ApplicationState::Auth,
            ApplicationState::Launched,
        );

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["from"], "auth");
        assert_eq!(json["to"], "launched");
        assert_eq!(json["host"], "db-1");
        assert_eq!(json["descriptor_id"], descriptor.id().to_string());

        let back: StatusReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_reporter_listens_until_removed() {
        let descriptor = descriptor();
        let id = attach_reporter(NetworkId::new(), &descriptor);
        assert_eq!(descriptor.listener_count(), 1);

        descriptor.set_state(ApplicationState::Unreachable);
        assert!(descriptor.remove_state_change_listener(id));
        assert_eq!(descriptor.listener_count(), 0);
    }
}
