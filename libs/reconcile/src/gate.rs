//! Single-use gates and the swappable slot used for cross-scanner sync.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// A latch that starts closed and can be released exactly once.
///
/// Waiting on an already-released gate returns immediately; releasing twice
/// is a no-op.
#[derive(Debug)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    /// Create a closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Create a gate that is already released.
    pub fn released() -> Self {
        let gate = Self::new();
        gate.release();
        gate
    }

    /// Release all current and future waiters.
    pub fn release(&self) {
        self.tx.send_replace(true);
    }

    /// True once released.
    pub fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is released.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|released| *released).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Holder of "the current gate" for a producer that completes rounds.
///
/// Consumers take the current gate with [`GateSlot::current`] and wait on
/// it; the producer calls [`GateSlot::advance`] at the end of each round,
/// which installs a fresh gate and releases the superseded one.
#[derive(Debug)]
pub struct GateSlot {
    current: Mutex<Arc<Gate>>,
}

impl GateSlot {
    /// Create a slot holding a closed gate.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(Gate::new())),
        }
    }

    /// The gate for the round in progress.
    pub fn current(&self) -> Arc<Gate> {
        Arc::clone(&self.current.lock())
    }

    /// Finish the current round.
    pub fn advance(&self) {
        let previous = std::mem::replace(&mut *self.current.lock(), Arc::new(Gate::new()));
        previous.release();
    }

    /// Release the current gate without installing a new one. Used when the
    /// producer is detached; every later `current()` is already released.
    pub fn close(&self) {
        self.current.lock().release();
    }

    /// Install a closed gate if the current one was released by `close`.
    pub fn reopen(&self) {
        let mut current = self.current.lock();
        if current.is_released() {
            *current = Arc::new(Gate::new());
        }
    }
}

impl Default for GateSlot {
    fn default() -> Self {
        Self::new()
    }
}
