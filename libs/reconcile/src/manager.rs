//! Application manager collaborator interface.
//!
//! One manager is usually shared by every descriptor of the same
//! application type. Managers must tolerate being invoked more than once
//! for the same logical transition: scanners retry on every cycle.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use drover_id::DeploymentId;

use crate::descriptor::Descriptor;
use crate::error::{ErrorKind, ManagerError};
use crate::state::ApplicationState;

/// Opaque reference to a deployed application instance.
#[derive(Clone)]
pub struct ApplicationHandle {
    id: DeploymentId,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ApplicationHandle {
    /// A handle with no payload.
    pub fn new() -> Self {
        Self {
            id: DeploymentId::new(),
            payload: None,
        }
    }

    /// A handle carrying manager-specific data.
    pub fn with_payload<T: Send + Sync + 'static>(payload: T) -> Self {
        Self {
            id: DeploymentId::new(),
            payload: Some(Arc::new(payload)),
        }
    }

    /// Identifier of this deployment.
    pub fn id(&self) -> DeploymentId {
        self.id
    }

    /// Downcast the payload.
    pub fn payload<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }
}

impl Default for ApplicationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApplicationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationHandle")
            .field("id", &self.id)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Deploy/kill/probe semantics for one application type.
#[async_trait]
pub trait ApplicationManager: Send + Sync {
    /// Deploy the application onto the descriptor's host.
    async fn deploy(&self, descriptor: &Descriptor) -> Result<ApplicationHandle, ManagerError>;

    /// Stop the deployed application.
    async fn kill(&self, descriptor: &Descriptor) -> Result<(), ManagerError>;

    /// Liveness call against the deployed application (not the host).
    /// Fails on any problem; the error kind drives classification.
    async fn attempt_application_call(&self, descriptor: &Descriptor) -> Result<(), ManagerError>;

    /// One-shot state probe for callers that do not run a status scanner.
    ///
    /// The default only distinguishes a running application from the
    /// address-level failures; implementations may do better.
    async fn probe_state(&self, descriptor: &Descriptor) -> ApplicationState {
        match self.attempt_application_call(descriptor).await {
            Ok(()) => ApplicationState::Running,
            Err(e) => match e.kind() {
                ErrorKind::Unresolvable => ApplicationState::Invalid,
                ErrorKind::Authentication => ApplicationState::NoAuth,
                ErrorKind::Network | ErrorKind::Timeout => ApplicationState::Unreachable,
                ErrorKind::Other => ApplicationState::Unknown,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_payload_downcast() {
        let handle = ApplicationHandle::with_payload(4242u32);
        assert_eq!(handle.payload::<u32>(), Some(&4242));
        assert!(handle.payload::<String>().is_none());
        assert!(ApplicationHandle::new().payload::<u32>().is_none());
    }

    #[test]
    fn test_handles_are_distinct() {
        assert_ne!(ApplicationHandle::new().id(), ApplicationHandle::new().id());
    }
}
