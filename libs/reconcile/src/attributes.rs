//! Typed per-descriptor attribute store.
//!
//! Collaborators stash auxiliary data (a pid, a port, a log path) on a
//! descriptor without extending it. Each [`AttributeKey`] instance carries
//! a process-unique slot number, so two features that happen to pick the
//! same name never read each other's values.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

/// Key for a value of type `T` in an [`Attributes`] map.
///
/// Keys are usually declared once per feature, e.g. in a `LazyLock` or as a
/// field of the collaborator that owns them.
pub struct AttributeKey<T> {
    slot: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> AttributeKey<T> {
    /// Allocate a new key. Two calls with the same name yield distinct keys.
    pub fn new(name: &'static str) -> Self {
        Self {
            slot: NEXT_SLOT.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    /// Human-readable name, for logging only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> std::fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeKey")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .finish()
    }
}

type Value = Arc<dyn Any + Send + Sync>;

/// Concurrency-safe heterogeneous map keyed by [`AttributeKey`].
#[derive(Default)]
pub struct Attributes {
    values: Mutex<HashMap<u64, Value>>,
}

impl Attributes {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value.
    pub fn get<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        let value = self.values.lock().get(&key.slot).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Store a value, returning the previous one.
    pub fn set<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>, value: T) -> Option<Arc<T>> {
        let previous = self.values.lock().insert(key.slot, Arc::new(value))?;
        previous.downcast::<T>().ok()
    }

    /// Remove a value, returning it.
    pub fn remove<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Arc<T>> {
        let previous = self.values.lock().remove(&key.slot)?;
        previous.downcast::<T>().ok()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// True when no value is stored.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl std::fmt::Debug for Attributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attributes").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let pid = AttributeKey::<u32>::new("pid");
        let attrs = Attributes::new();

        assert!(attrs.get(&pid).is_none());
        assert!(attrs.set(&pid, 42).is_none());
        assert_eq!(attrs.get(&pid).as_deref(), Some(&42));

        let old = attrs.set(&pid, 43);
        assert_eq!(old.as_deref(), Some(&42));

        assert_eq!(attrs.remove(&pid).as_deref(), Some(&43));
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_same_name_keys_do_not_collide() {
        let a = AttributeKey::<String>::new("port");
        let b = AttributeKey::<u16>::new("port");
        let attrs = Attributes::new();

        attrs.set(&a, "8080".to_string());
        attrs.set(&b, 9090);

        assert_eq!(attrs.get(&a).as_deref().map(String::as_str), Some("8080"));
        assert_eq!(attrs.get(&b).as_deref(), Some(&9090));
        assert_eq!(attrs.len(), 2);
    }
}
