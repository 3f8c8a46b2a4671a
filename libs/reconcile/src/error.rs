//! Error types for the reconciliation engine and its collaborators.
//!
//! Probe outcomes are classified by error *category* ([`ErrorKind`]), never
//! by message text.

use std::time::Duration;

use thiserror::Error;

/// Engine-level errors returned to direct callers of the network API.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Timeout waiting for convergence.
    #[error("timeout after {elapsed:?} waiting for {resource}")]
    Timeout {
        resource: String,
        elapsed: Duration,
    },

    /// Descriptor is not a member of the network.
    #[error("descriptor not found: {0}")]
    NotFound(String),

    /// The network has been shut down and cannot be reused.
    #[error("network {0} has been shut down")]
    ShutDown(String),

    /// Action failed in the application manager.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Coarse failure category shared by host and manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The address could not be resolved.
    Unresolvable,
    /// The host rejected our credentials.
    Authentication,
    /// Connection refused, reset, or no route.
    Network,
    /// The operation did not finish in time.
    Timeout,
    /// Anything the classification logic does not anticipate.
    Other,
}

/// Errors raised by a [`Host`](crate::host::Host) implementation.
#[derive(Debug, Error)]
pub enum HostError {
    /// Host name or address does not resolve.
    #[error("address unresolvable: {0}")]
    Unresolvable(String),

    /// Authentication against the host failed.
    #[error("authentication failed for {0}")]
    Authentication(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The command did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The command ran but exited unsuccessfully.
    #[error("command exited with status {status}: {stderr}")]
    Exited { status: i32, stderr: String },

    /// The host has been closed.
    #[error("host {0} is closed")]
    Closed(String),

    /// Local I/O failure (spawning, pipes).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unresolvable(_) => ErrorKind::Unresolvable,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Network(_) | Self::Closed(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::BrokenPipe => ErrorKind::Network,
                std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
                std::io::ErrorKind::PermissionDenied => ErrorKind::Authentication,
                _ => ErrorKind::Other,
            },
            Self::Exited { .. } => ErrorKind::Other,
        }
    }
}

/// Errors raised by an [`ApplicationManager`](crate::manager::ApplicationManager).
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The application endpoint's address does not resolve.
    #[error("application address unresolvable: {0}")]
    Unresolvable(String),

    /// The descriptor has no deployed instance to act on.
    #[error("no deployed instance for {0}")]
    NotDeployed(String),

    /// A host operation failed underneath the manager.
    #[error("host failure: {0}")]
    Host(#[from] HostError),

    /// The application refused or failed the call.
    #[error("{0}")]
    Failed(String),

    /// Unanticipated failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ManagerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unresolvable(_) => ErrorKind::Unresolvable,
            Self::Host(e) => e.kind(),
            Self::NotDeployed(_) | Self::Failed(_) | Self::Other(_) => ErrorKind::Other,
        }
    }
}
