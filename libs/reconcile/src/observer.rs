//! State-change listener registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::state::ApplicationState;

/// Callback invoked with `(old, new)` on every effective state transition.
pub type StateListener = Arc<dyn Fn(ApplicationState, ApplicationState) + Send + Sync>;

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Listener list attached to one descriptor.
///
/// Firing works on a snapshot, so listeners may subscribe or unsubscribe
/// (including themselves) while a notification pass is running.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ObserverId, StateListener)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: StateListener) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub(crate) fn notify(&self, old: ApplicationState, new: ApplicationState) {
        let snapshot: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(old, new);
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Unsubscribes on drop.
pub(crate) struct Subscription<'a> {
    registry: &'a ObserverRegistry,
    id: ObserverId,
}

impl<'a> Subscription<'a> {
    pub(crate) fn new(registry: &'a ObserverRegistry, listener: StateListener) -> Self {
        let id = registry.subscribe(listener);
        Self { registry, id }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_all_and_unsubscribe() {
        let registry = ObserverRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let ids: Vec<_> = (0..3)
            .map(|_| {
                let hits = Arc::clone(&hits);
                registry.subscribe(Arc::new(move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }))
            })
            .collect();

        registry.notify(ApplicationState::Unknown, ApplicationState::Auth);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert!(registry.unsubscribe(ids[1]));
        assert!(!registry.unsubscribe(ids[1]));

        registry.notify(ApplicationState::Auth, ApplicationState::Running);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself_while_firing() {
        let registry = Arc::new(ObserverRegistry::new());
        let own_id = Arc::new(Mutex::new(None::<ObserverId>));

        let id = registry.subscribe(Arc::new({
            let registry = Arc::clone(&registry);
            let own_id = Arc::clone(&own_id);
            move |_, _| {
                if let Some(id) = *own_id.lock() {
                    registry.unsubscribe(id);
                }
            }
        }));
        *own_id.lock() = Some(id);

        registry.notify(ApplicationState::Unknown, ApplicationState::Auth);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscription_guard() {
        let registry = ObserverRegistry::new();
        {
            let _sub = Subscription::new(&registry, Arc::new(|_, _| {}));
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }
}
