//! Client-side reconciliation engine.
//!
//! This library tracks application instances deployed across a fleet of
//! hosts and drives them toward a steady state without a central
//! scheduler. Key concepts:
//!
//! - **Descriptor**: one application instance on one host, with an observed
//!   [`ApplicationState`], an opaque deployment handle and typed attributes.
//! - **Network**: a concurrency-safe set of descriptors for one application,
//!   plus the scanners attached to it.
//! - **Scanner**: a periodic policy run over every descriptor with bounded
//!   fan-out and a per-cycle budget (status, auto-deploy, auto-kill,
//!   auto-remove).
//!
//! ```text
//! Network ──schedules──▶ Scanner cycle ──fans out──▶ check(descriptor)
//!    ▲                                                   │
//!    └────────── add/remove ◀── set_state ◀── Host / ApplicationManager
//! ```
//!
//! # Invariants
//!
//! - Actions are retried every cycle; collaborators must be idempotent.
//! - Nothing raised inside a check escapes its cycle.
//! - State notifications for one descriptor are delivered in write order,
//!   never for a no-op transition.

pub mod attributes;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod gate;
pub mod host;
pub mod manager;
pub mod mock;
pub mod network;
pub mod observer;
pub mod retry;
pub mod scanner;
pub mod state;

pub use attributes::AttributeKey;
pub use config::ScannerSettings;
pub use descriptor::Descriptor;
pub use error::{ErrorKind, HostError, ManagerError, ReconcileError};
pub use gate::Gate;
pub use host::{Host, HostProcess, ProcessOutput};
pub use manager::{ApplicationHandle, ApplicationManager};
pub use network::Network;
pub use observer::ObserverId;
pub use scanner::{
    AutoDeployScanner, AutoKillScanner, AutoRemoveScanner, CycleReport, Scanner, ScannerCore,
    StatusScanner,
};
pub use state::ApplicationState;

pub use drover_id::{CycleSeq, DescriptorId, DeploymentId, NetworkId, ScannerId};
