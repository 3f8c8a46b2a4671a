//! The network: a concurrency-safe set of descriptors plus the scanners
//! that reconcile it.
//!
//! `Network` is a cheap handle; clones share the same registry. Scanner
//! tasks only hold a weak reference, so dropping every handle stops them.
//! Call [`Network::shutdown`] for an orderly stop that also destroys local
//! processes and closes hosts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drover_id::{DescriptorId, NetworkId, ScannerId};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::descriptor::Descriptor;
use crate::error::{ManagerError, ReconcileError};
use crate::manager::ApplicationHandle;
use crate::scanner::{self, CycleReport, Scanner};
use crate::state::ApplicationState;

struct AttachedScanner {
    scanner: Arc<dyn Scanner>,
    task: JoinHandle<()>,
}

pub(crate) struct NetworkInner {
    id: NetworkId,
    application_name: String,
    /// Insertion-ordered; readers take snapshots.
    descriptors: RwLock<Vec<Arc<Descriptor>>>,
    scanners: Mutex<HashMap<ScannerId, AttachedScanner>>,
    shut_down: AtomicBool,
}

/// Handle to a managed set of descriptors.
#[derive(Clone)]
pub struct Network {
    inner: Arc<NetworkInner>,
}

impl Network {
    /// Create an empty network for one application.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                id: NetworkId::new(),
                application_name: application_name.into(),
                descriptors: RwLock::new(Vec::new()),
                scanners: Mutex::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<NetworkInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> NetworkId {
        self.inner.id
    }

    pub fn application_name(&self) -> &str {
        &self.inner.application_name
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Add a descriptor. Returns false if it is already a member or the
    /// network has been shut down.
    pub fn add(&self, descriptor: Arc<Descriptor>) -> bool {
        if self.is_shut_down() {
            warn!(network_id = %self.inner.id, descriptor_id = %descriptor.id(), "Add rejected: network shut down");
            return false;
        }

        let mut descriptors = self.inner.descriptors.write();
        if descriptors.iter().any(|d| d.id() == descriptor.id()) {
            return false;
        }

        debug!(
            network_id = %self.inner.id,
            descriptor_id = %descriptor.id(),
            host = descriptor.host().address(),
            "Descriptor added"
        );
        descriptors.push(descriptor);
        true
    }

    /// Remove a descriptor. Returns true if it was a member.
    pub fn remove(&self, descriptor: &Descriptor) -> bool {
        self.remove_by_id(descriptor.id()).is_some()
    }

    /// Remove a descriptor by id, returning it.
    pub fn remove_by_id(&self, id: DescriptorId) -> Option<Arc<Descriptor>> {
        let mut descriptors = self.inner.descriptors.write();
        let index = descriptors.iter().position(|d| d.id() == id)?;
        let removed = descriptors.remove(index);
        debug!(network_id = %self.inner.id, descriptor_id = %id, "Descriptor removed");
        Some(removed)
    }

    pub fn contains(&self, descriptor: &Descriptor) -> bool {
        self.get(descriptor.id()).is_some()
    }

    pub fn get(&self, id: DescriptorId) -> Option<Arc<Descriptor>> {
        self.inner
            .descriptors
            .read()
            .iter()
            .find(|d| d.id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.descriptors.read().is_empty()
    }

    /// Snapshot of the members in insertion order. Later adds and removes
    /// do not affect the returned vector.
    pub fn descriptors(&self) -> Vec<Arc<Descriptor>> {
        self.inner.descriptors.read().clone()
    }

    /// Members currently in `state`.
    pub fn descriptors_in(&self, state: ApplicationState) -> Vec<Arc<Descriptor>> {
        self.inner
            .descriptors
            .read()
            .iter()
            .filter(|d| d.state() == state)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Scanners
    // =========================================================================

    /// Attach a scanner and schedule its cycles. The first cycle starts
    /// immediately. Returns false if it is already attached, the network
    /// has been shut down, or there is no tokio runtime to schedule on.
    pub fn add_scanner(&self, scanner: Arc<dyn Scanner>) -> bool {
        if self.is_shut_down() {
            warn!(network_id = %self.inner.id, scanner = scanner.name(), "Scanner rejected: network shut down");
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(scanner = scanner.name(), "Cannot schedule scanner outside a tokio runtime");
            return false;
        };

        let mut scanners = self.inner.scanners.lock();
        if scanners.contains_key(&scanner.id()) {
            return false;
        }

        scanner.core().attach(Arc::downgrade(&self.inner));
        let task = runtime.spawn(scanner::run_schedule(Arc::clone(&scanner)));

        info!(
            network_id = %self.inner.id,
            scanner = scanner.name(),
            scanner_id = %scanner.id(),
            "Scanner attached"
        );
        scanners.insert(scanner.id(), AttachedScanner { scanner, task });
        true
    }

    /// Detach a scanner. Future cycles are cancelled and a cycle in flight
    /// is aborted, not awaited. Its current gate is released.
    pub fn remove_scanner(&self, scanner: &dyn Scanner) -> bool {
        let Some(attached) = self.inner.scanners.lock().remove(&scanner.id()) else {
            return false;
        };

        attached.task.abort();
        attached.scanner.core().detach();
        info!(
            network_id = %self.inner.id,
            scanner = scanner.name(),
            scanner_id = %scanner.id(),
            "Scanner detached"
        );
        true
    }

    /// Attached scanners, in no particular order.
    pub fn scanners(&self) -> Vec<Arc<dyn Scanner>> {
        self.inner
            .scanners
            .lock()
            .values()
            .map(|attached| Arc::clone(&attached.scanner))
            .collect()
    }

    /// Toggle every attached scanner. Schedules are untouched: disabled
    /// scanners keep cycling, with every check a no-op.
    pub fn set_scan_enabled(&self, enabled: bool) {
        for scanner in self.scanners() {
            scanner.set_enabled(enabled);
        }
        info!(network_id = %self.inner.id, enabled, "Scanning toggled");
    }

    /// Run one cycle of `scanner` now, outside its schedule. The scanner
    /// does not need to be attached.
    pub async fn scan(&self, scanner: &Arc<dyn Scanner>) -> CycleReport {
        scanner::run_cycle(scanner, self).await
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Wait until every current member is in one of `states`.
    ///
    /// Members added after the call starts are not waited for; members
    /// removed while waiting are still waited for.
    pub async fn await_any_of_states(&self, states: &[ApplicationState]) {
        let descriptors = self.descriptors();
        join_all(descriptors.iter().map(|d| d.await_any_of_states(states))).await;
    }

    /// [`Network::await_any_of_states`] bounded by `timeout`.
    pub async fn await_any_of_states_timeout(
        &self,
        states: &[ApplicationState],
        timeout: Duration,
    ) -> Result<(), ReconcileError> {
        tokio::time::timeout(timeout, self.await_any_of_states(states))
            .await
            .map_err(|_| ReconcileError::Timeout {
                resource: format!("{} members to reach {:?}", self.inner.application_name, states),
                elapsed: timeout,
            })
    }

    // =========================================================================
    // Direct actions
    // =========================================================================

    /// Deploy one member now, storing the handle and marking it `Launched`.
    pub async fn deploy(&self, descriptor: &Arc<Descriptor>) -> Result<ApplicationHandle, ReconcileError> {
        self.ensure_member(descriptor)?;
        deploy_one(descriptor).await.map_err(Into::into)
    }

    /// Kill one member now, marking it `Killed`.
    pub async fn kill(&self, descriptor: &Arc<Descriptor>) -> Result<(), ReconcileError> {
        self.ensure_member(descriptor)?;
        kill_one(descriptor).await.map_err(Into::into)
    }

    /// Deploy every member concurrently.
    pub async fn deploy_all(&self) -> Vec<(DescriptorId, Result<ApplicationHandle, ManagerError>)> {
        let descriptors = self.descriptors();
        join_all(descriptors.iter().map(|d| async move { (d.id(), deploy_one(d).await) })).await
    }

    /// Kill every member concurrently.
    pub async fn kill_all(&self) -> Vec<(DescriptorId, Result<(), ManagerError>)> {
        let descriptors = self.descriptors();
        join_all(descriptors.iter().map(|d| async move { (d.id(), kill_one(d).await) })).await
    }

    /// Ask each member's manager for a one-shot state and apply it.
    pub async fn probe_all(&self) {
        let descriptors = self.descriptors();
        join_all(descriptors.iter().map(|d| async move {
            let state = d.manager().probe_state(d).await;
            d.set_state(state);
        }))
        .await;
    }

    fn ensure_member(&self, descriptor: &Descriptor) -> Result<(), ReconcileError> {
        if self.is_shut_down() {
            return Err(ReconcileError::ShutDown(self.inner.id.to_string()));
        }
        if !self.contains(descriptor) {
            return Err(ReconcileError::NotFound(descriptor.id().to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop every scanner, destroy local processes and close all hosts.
    /// The network cannot be reused afterwards. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            network_id = %self.inner.id,
            application = %self.inner.application_name,
            "Shutting down network"
        );

        let attached: Vec<AttachedScanner> = self.inner.scanners.lock().drain().map(|(_, a)| a).collect();
        for AttachedScanner { scanner, task } in attached {
            task.abort();
            scanner.core().detach();
        }

        let descriptors = self.descriptors();
        join_all(descriptors.iter().map(|d| async move {
            d.destroy_local_process().await;
            d.host().close().await;
        }))
        .await;

        info!(network_id = %self.inner.id, descriptors = descriptors.len(), "Network shut down");
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("id", &self.inner.id)
            .field("application_name", &self.inner.application_name)
            .field("descriptors", &self.len())
            .field("scanners", &self.inner.scanners.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

async fn deploy_one(descriptor: &Descriptor) -> Result<ApplicationHandle, ManagerError> {
    let handle = descriptor.manager().deploy(descriptor).await?;
    descriptor.set_application_handle(handle.clone());
    descriptor.set_state(ApplicationState::Launched);
    Ok(handle)
}

async fn kill_one(descriptor: &Descriptor) -> Result<(), ManagerError> {
    descriptor.manager().kill(descriptor).await?;
    descriptor.set_state(ApplicationState::Killed);
    Ok(())
}
