//! Periodic reconciliation policies over a network.
//!
//! A scanner only implements [`Scanner::check`] for one descriptor. The
//! shared machinery lives here and in [`orchestrator`]:
//!
//! ```text
//! schedule loop (one task per attached scanner, fixed delay)
//! └── run_cycle
//!     ├── one check task per descriptor (bounded fan-out, cycle budget)
//!     ├── Scanner::cycle_finished
//!     └── wait for sync_with dependencies, then advance the gate
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use drover_id::{CycleSeq, ScannerId};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ScannerSettings;
use crate::descriptor::Descriptor;
use crate::gate::{Gate, GateSlot};
use crate::network::{Network, NetworkInner};

pub mod auto_deploy;
pub mod auto_kill;
pub mod auto_remove;
pub mod orchestrator;
pub mod status;

pub use auto_deploy::AutoDeployScanner;
pub use auto_kill::AutoKillScanner;
pub use auto_remove::AutoRemoveScanner;
pub use orchestrator::{run_cycle, CycleReport};
pub use status::StatusScanner;

/// A periodic, independently enabled reconciliation policy.
#[async_trait]
pub trait Scanner: Send + Sync + 'static {
    /// Name for logs.
    fn name(&self) -> &'static str;

    /// Shared scanner state.
    fn core(&self) -> &ScannerCore;

    /// Reconcile one descriptor. Errors are logged by the orchestrator and
    /// never abort the cycle.
    async fn check(&self, network: &Network, descriptor: &Arc<Descriptor>) -> anyhow::Result<()>;

    /// Hook run after every cycle, before dependencies are awaited.
    async fn cycle_finished(&self, _report: &CycleReport) {}

    fn id(&self) -> ScannerId {
        self.core().id()
    }

    fn cycle_delay(&self) -> Duration {
        self.core().settings().cycle_delay
    }

    fn scan_timeout(&self) -> Duration {
        self.core().settings().scan_timeout
    }

    /// Takes effect for checks that start after the call.
    fn set_enabled(&self, enabled: bool) {
        self.core().set_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.core().is_enabled()
    }

    /// Make this scanner wait, at the end of each of its cycles, for the
    /// next completed cycle of `other`.
    fn sync_with(&self, other: &dyn Scanner) {
        self.core().sync_with(other.core());
    }

    /// Gate released when the cycle in progress completes.
    fn current_gate(&self) -> Arc<Gate> {
        self.core().gate().current()
    }
}

/// State common to every scanner.
pub struct ScannerCore {
    id: ScannerId,
    settings: ScannerSettings,
    enabled: AtomicBool,
    workers: Arc<Semaphore>,
    gate: Arc<GateSlot>,
    dependencies: Mutex<Vec<Arc<GateSlot>>>,
    network: Mutex<Option<Weak<NetworkInner>>>,
    completed_cycles: AtomicU64,
}

impl ScannerCore {
    /// A disabled scanner core.
    pub fn new(settings: ScannerSettings) -> Self {
        let permits = settings.check_concurrency.max(1);
        Self {
            id: ScannerId::new(),
            settings,
            enabled: AtomicBool::new(false),
            workers: Arc::new(Semaphore::new(permits)),
            gate: Arc::new(GateSlot::new()),
            dependencies: Mutex::new(Vec::new()),
            network: Mutex::new(None),
            completed_cycles: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ScannerId {
        self.id
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            debug!(scanner_id = %self.id, enabled, "Scanner toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn gate(&self) -> &GateSlot {
        &self.gate
    }

    pub fn sync_with(&self, other: &ScannerCore) {
        if other.id == self.id {
            warn!(scanner_id = %self.id, "Ignoring request to sync a scanner with itself");
            return;
        }
        self.dependencies.lock().push(Arc::clone(&other.gate));
    }

    /// Cycles completed since creation.
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::SeqCst)
    }

    /// The network this scanner is attached to, if it is still alive.
    pub fn network(&self) -> Option<Network> {
        let weak = self.network.lock().clone()?;
        weak.upgrade().map(Network::from_inner)
    }

    pub(crate) fn workers(&self) -> Arc<Semaphore> {
        Arc::clone(&self.workers)
    }

    pub(crate) fn attach(&self, network: Weak<NetworkInner>) {
        self.gate.reopen();
        *self.network.lock() = Some(network);
    }

    pub(crate) fn detach(&self) {
        *self.network.lock() = None;
        self.gate.close();
    }

    /// Wait for every dependency's current round, then release our own gate.
    pub(crate) async fn finish_cycle(&self) -> CycleSeq {
        let dependencies: Vec<Arc<Gate>> = self
            .dependencies
            .lock()
            .iter()
            .map(|slot| slot.current())
            .collect();

        for gate in dependencies {
            // Bounded so that a dependency that is never scheduled cannot
            // stall this scanner forever.
            if tokio::time::timeout(self.settings.scan_timeout, gate.wait())
                .await
                .is_err()
            {
                warn!(
                    scanner_id = %self.id,
                    timeout_secs = self.settings.scan_timeout.as_secs_f64(),
                    "Timed out waiting for dependent scanner cycle"
                );
            }
        }

        self.gate.advance();
        CycleSeq::new(self.completed_cycles.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }
}

impl std::fmt::Debug for ScannerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerCore")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("enabled", &self.is_enabled())
            .field("completed_cycles", &self.completed_cycles())
            .finish()
    }
}

/// Drive `scanner` with fixed-delay cycles until it is detached or its
/// network is dropped.
pub(crate) async fn run_schedule(scanner: Arc<dyn Scanner>) {
    info!(
        scanner = scanner.name(),
        scanner_id = %scanner.id(),
        cycle_delay_ms = scanner.cycle_delay().as_millis() as u64,
        scan_timeout_ms = scanner.scan_timeout().as_millis() as u64,
        "Starting scanner"
    );

    loop {
        let Some(network) = scanner.core().network() else {
            debug!(scanner = scanner.name(), "Scanner detached, stopping schedule");
            break;
        };

        run_cycle(&scanner, &network).await;
        drop(network);

        tokio::time::sleep(scanner.cycle_delay()).await;
    }
}
