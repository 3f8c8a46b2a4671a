//! A single managed application instance bound to one host.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drover_id::DescriptorId;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::debug;

use crate::attributes::{AttributeKey, Attributes};
use crate::error::ReconcileError;
use crate::host::{Host, HostProcess};
use crate::manager::{ApplicationHandle, ApplicationManager};
use crate::observer::{ObserverId, ObserverRegistry, StateListener, Subscription};
use crate::state::ApplicationState;

/// One application instance on one host.
///
/// The observed state is published through an atomic and can be read from
/// any task without locking. Writes go through [`Descriptor::set_state`],
/// which serializes transitions so that listeners see them in order.
pub struct Descriptor {
    id: DescriptorId,
    host: Arc<dyn Host>,
    manager: Arc<dyn ApplicationManager>,

    state: AtomicU8,
    /// Serializes `set_state` so notifications follow write order.
    transition: Mutex<()>,
    observers: ObserverRegistry,

    application_handle: RwLock<Option<ApplicationHandle>>,
    attributes: Attributes,

    /// Process launched on a local host; destroyed on network shutdown.
    local_process: tokio::sync::Mutex<Option<Box<dyn HostProcess>>>,
}

impl Descriptor {
    /// Create a descriptor in the `Unknown` state.
    pub fn new(host: Arc<dyn Host>, manager: Arc<dyn ApplicationManager>) -> Self {
        Self {
            id: DescriptorId::new(),
            host,
            manager,
            state: AtomicU8::new(ApplicationState::Unknown.as_u8()),
            transition: Mutex::new(()),
            observers: ObserverRegistry::new(),
            application_handle: RwLock::new(None),
            attributes: Attributes::new(),
            local_process: tokio::sync::Mutex::new(None),
        }
    }

    /// Convenience constructor returning an `Arc`, which is what networks hold.
    pub fn shared(host: Arc<dyn Host>, manager: Arc<dyn ApplicationManager>) -> Arc<Self> {
        Arc::new(Self::new(host, manager))
    }

    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn manager(&self) -> &Arc<dyn ApplicationManager> {
        &self.manager
    }

    /// Current observed state.
    pub fn state(&self) -> ApplicationState {
        ApplicationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Replace the state and return the previous one.
    ///
    /// Listeners run synchronously, on the calling task, only when the
    /// value actually changes. A listener must not call `set_state` on the
    /// same descriptor from inside the callback.
    pub fn set_state(&self, new: ApplicationState) -> ApplicationState {
        let _transition = self.transition.lock();
        let old = ApplicationState::from_u8(self.state.swap(new.as_u8(), Ordering::AcqRel));

        if old != new {
            debug!(
                descriptor_id = %self.id,
                host = self.host.address(),
                from = %old,
                to = %new,
                "State changed"
            );
            self.observers.notify(old, new);
        }

        old
    }

    /// Register a state-change listener.
    pub fn add_state_change_listener<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(ApplicationState, ApplicationState) + Send + Sync + 'static,
    {
        self.observers.subscribe(Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_state_change_listener(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Number of registered listeners, including pending waiters.
    pub fn listener_count(&self) -> usize {
        self.observers.len()
    }

    /// Wait until the state is one of `states` and return it.
    ///
    /// Returns immediately if the state already matches. Dropping the
    /// future cancels the wait and removes its listener. Waiting on an
    /// empty set never completes.
    pub async fn await_any_of_states(&self, states: &[ApplicationState]) -> ApplicationState {
        let current = self.state();
        if states.contains(&current) {
            return current;
        }

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let wanted = states.to_vec();
        let listener: StateListener = Arc::new(move |_, new| {
            if wanted.contains(&new) {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(new);
                }
            }
        });
        let _subscription = Subscription::new(&self.observers, listener);

        // The transition may have landed between the first check and the
        // subscription.
        let current = self.state();
        if states.contains(&current) {
            return current;
        }

        match rx.await {
            Ok(reached) => reached,
            Err(_) => self.state(),
        }
    }

    /// [`Descriptor::await_any_of_states`] bounded by `timeout`.
    pub async fn await_any_of_states_timeout(
        &self,
        states: &[ApplicationState],
        timeout: Duration,
    ) -> Result<ApplicationState, ReconcileError> {
        tokio::time::timeout(timeout, self.await_any_of_states(states))
            .await
            .map_err(|_| ReconcileError::Timeout {
                resource: format!("{} to reach {:?}", self.id, states),
                elapsed: timeout,
            })
    }

    /// Handle of the last successful deploy, if any.
    pub fn application_handle(&self) -> Option<ApplicationHandle> {
        self.application_handle.read().clone()
    }

    pub fn set_application_handle(&self, handle: ApplicationHandle) -> Option<ApplicationHandle> {
        self.application_handle.write().replace(handle)
    }

    pub fn clear_application_handle(&self) -> Option<ApplicationHandle> {
        self.application_handle.write().take()
    }

    pub fn attribute<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        self.attributes.get(key)
    }

    pub fn set_attribute<T: Send + Sync + 'static>(
        &self,
        key: &AttributeKey<T>,
        value: T,
    ) -> Option<Arc<T>> {
        self.attributes.set(key, value)
    }

    pub fn remove_attribute<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        self.attributes.remove(key)
    }

    /// Track a process started on a local host so shutdown can destroy it.
    /// Any process tracked before is returned, still running.
    pub async fn set_local_process(
        &self,
        process: Box<dyn HostProcess>,
    ) -> Option<Box<dyn HostProcess>> {
        self.local_process.lock().await.replace(process)
    }

    /// Stop tracking the local process without destroying it.
    pub async fn take_local_process(&self) -> Option<Box<dyn HostProcess>> {
        self.local_process.lock().await.take()
    }

    /// Whether the tracked local process is still alive; `None` if no
    /// process is tracked.
    pub async fn local_process_running(&self) -> Option<bool> {
        let mut guard = self.local_process.lock().await;
        let process = guard.as_mut()?;
        match process.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                debug!(descriptor_id = %self.id, status, "Local process has exited");
                Some(false)
            }
            Err(e) => {
                debug!(descriptor_id = %self.id, error = %e, "Cannot poll local process");
                Some(false)
            }
        }
    }

    /// Destroy the tracked local process. Returns false if none was tracked.
    pub async fn destroy_local_process(&self) -> bool {
        let process = self.local_process.lock().await.take();
        match process {
            Some(mut process) => {
                debug!(
                    descriptor_id = %self.id,
                    pid = ?process.id(),
                    "Destroying local process"
                );
                process.destroy().await;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("host", &self.host.address())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHost, MockManager};
    use std::sync::atomic::AtomicUsize;

    fn descriptor() -> Arc<Descriptor> {
        Descriptor::shared(
            Arc::new(MockHost::new("node-1")),
            Arc::new(MockManager::new()),
        )
    }

    #[test]
    fn test_initial_state_unknown() {
        assert_eq!(descriptor().state(), ApplicationState::Unknown);
    }

    #[test]
    fn test_same_state_fires_once() {
        let d = descriptor();
        let fired = Arc::new(AtomicUsize::new(0));
        d.add_state_change_listener({
            let fired = Arc::clone(&fired);
            move |_, _| {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });

        d.set_state(ApplicationState::Auth);
        d.set_state(ApplicationState::Auth);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_receives_old_and_new() {
        let d = descriptor();
        let seen = Arc::new(Mutex::new(Vec::new()));
        d.add_state_change_listener({
            let seen = Arc::clone(&seen);
            move |old, new| seen.lock().push((old, new))
        });

        d.set_state(ApplicationState::Auth);
        d.set_state(ApplicationState::Running);

        assert_eq!(
            *seen.lock(),
            vec![
                (ApplicationState::Unknown, ApplicationState::Auth),
                (ApplicationState::Auth, ApplicationState::Running),
            ]
        );
    }

    #[test]
    fn test_remove_listener() {
        let d = descriptor();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = d.add_state_change_listener({
            let fired = Arc::clone(&fired);
            move |_, _| {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(d.remove_state_change_listener(id));
        d.set_state(ApplicationState::Running);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_await_fast_path() {
        let d = descriptor();
        d.set_state(ApplicationState::Running);

        let reached = tokio::time::timeout(
            Duration::from_millis(100),
            d.await_any_of_states(&[ApplicationState::Running, ApplicationState::Killed]),
        )
        .await
        .unwrap();

        assert_eq!(reached, ApplicationState::Running);
        assert_eq!(d.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_await_wakes_on_transition() {
        let d = descriptor();
        let waiter = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.await_any_of_states(&[ApplicationState::Killed]).await }
        });

        tokio::task::yield_now().await;
        d.set_state(ApplicationState::Running);
        d.set_state(ApplicationState::Killed);

        let reached = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reached, ApplicationState::Killed);
        assert_eq!(d.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_await_timeout_and_cleanup() {
        let d = descriptor();
        let result = d
            .await_any_of_states_timeout(&[ApplicationState::Running], Duration::from_millis(20))
            .await;

        assert!(matches!(result, Err(ReconcileError::Timeout { .. })));
        assert_eq!(d.listener_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_await_under_concurrent_load() {
        let descriptors: Vec<_> = (0..100).map(|_| descriptor()).collect();

        let mut waiters = Vec::new();
        for d in &descriptors {
            let d = Arc::clone(d);
            waiters.push(tokio::spawn(async move {
                d.await_any_of_states(&[ApplicationState::Running]).await
            }));
        }

        let mut writers = Vec::new();
        for d in &descriptors {
            let d = Arc::clone(d);
            writers.push(tokio::spawn(async move {
                d.set_state(ApplicationState::Auth);
                d.set_state(ApplicationState::Running);
            }));
        }

        let all = futures_util::future::join_all(waiters);
        let results = tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("waiters must finish");
        for result in results {
            assert_eq!(result.unwrap(), ApplicationState::Running);
        }
        for writer in writers {
            writer.await.unwrap();
        }
    }

    #[test]
    fn test_application_handle_not_cleared_implicitly() {
        let d = descriptor();
        assert!(d.application_handle().is_none());

        let handle = ApplicationHandle::new();
        d.set_application_handle(handle.clone());
        d.set_state(ApplicationState::Killed);

        assert_eq!(d.application_handle().map(|h| h.id()), Some(handle.id()));
        assert!(d.clear_application_handle().is_some());
        assert!(d.application_handle().is_none());
    }

    #[tokio::test]
    async fn test_destroy_local_process() {
        let host = MockHost::new("node-1");
        let d = descriptor();
        assert!(!d.destroy_local_process().await);

        assert_eq!(d.local_process_running().await, None);
        host.set_behavior(crate::mock::HostBehavior::Hang);
        let process = host.execute("sleep 100").await.unwrap();
        d.set_local_process(process).await;
        assert_eq!(d.local_process_running().await, Some(true));
        assert!(d.destroy_local_process().await);
        assert_eq!(host.destroyed_processes(), 1);
    }
}
