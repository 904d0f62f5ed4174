//! Keyed tables backing the container
//!
//! Three maps, all keyed by service name:
//!
//! - bindings: name -> [`Binding`], overwritten by every `bind`
//! - shared: name -> [`Instance`], filled once per shared binding
//! - resolving: name -> in-flight construction of a shared binding
//!
//! The resolving table only holds weak handles. The construction future
//! owns a container handle, so a strong one here would keep the container
//! alive forever once every `make` awaiting it is dropped.
//!
//! Uses DashMap with ahash so handles on different threads can bind and
//! resolve without a global lock.

use crate::binding::{Binding, Instance};
use crate::Result;
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, Shared, WeakShared};

/// A shared binding under construction. Every concurrent `make` awaits a
/// clone of the same future.
pub(crate) type PendingInstance = Shared<BoxFuture<'static, Result<Instance>>>;

/// Outcome of asking for a shared instance
pub(crate) enum SharedSlot {
    /// Already constructed
    Ready(Instance),
    /// Under construction (possibly started by this very call)
    Pending(PendingInstance),
}

/// Binding, shared-instance and in-flight tables
pub(crate) struct ServiceStorage {
    bindings: DashMap<String, Binding, RandomState>,
    shared: DashMap<String, Instance, RandomState>,
    resolving: DashMap<String, WeakShared<BoxFuture<'static, Result<Instance>>>, RandomState>,
}

impl ServiceStorage {
    /// Create new empty storage.
    ///
    /// Uses 8 shards: containers rarely hold more than a few dozen
    /// services, and DashMap's default of num_cpus * 4 is wasted on them.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with pre-allocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        Self {
            bindings: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            shared: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            resolving: DashMap::with_hasher_and_shard_amount(RandomState::new(), shard_amount),
        }
    }

    /// Store a binding. Returns true if it replaced an earlier one.
    ///
    /// A cached instance from the replaced binding stays in the shared
    /// table and keeps being handed out.
    #[inline]
    pub fn bind(&self, name: String, binding: Binding) -> bool {
        self.bindings.insert(name, binding).is_some()
    }

    /// Look up the binding for a name
    #[inline]
    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.bindings.get(name).map(|b| b.clone())
    }

    /// Check if a name has a binding
    #[inline]
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Check if every name has a binding
    #[inline]
    pub fn is_bound_all(&self, names: &[String]) -> bool {
        names.iter().all(|name| self.is_bound(name))
    }

    /// Already-constructed shared instance, if any
    #[inline]
    pub fn shared_instance(&self, name: &str) -> Option<Instance> {
        self.shared.get(name).map(|i| i.clone())
    }

    /// Get the cached instance or join/start its construction.
    ///
    /// `start` is only called when nothing is cached and no live
    /// construction is in flight; it must build the future without polling
    /// it, since it runs while the in-flight slot is held. A construction
    /// whose waiters were all dropped counts as not in flight.
    pub fn shared_slot<F>(&self, name: &str, start: F) -> SharedSlot
    where
        F: FnOnce() -> PendingInstance,
    {
        if let Some(instance) = self.shared_instance(name) {
            return SharedSlot::Ready(instance);
        }

        match self.resolving.entry(name.to_owned()) {
            Entry::Occupied(mut entry) => {
                if let Some(pending) = entry.get().upgrade() {
                    return SharedSlot::Pending(pending);
                }
                if let Some(instance) = self.shared_instance(name) {
                    return SharedSlot::Ready(instance);
                }
                let pending = start();
                if let Some(weak) = pending.downgrade() {
                    entry.insert(weak);
                }
                SharedSlot::Pending(pending)
            }
            Entry::Vacant(entry) => {
                // A construction may have finished between the cache check
                // and taking the slot: finished work stores before it clears.
                if let Some(instance) = self.shared_instance(name) {
                    return SharedSlot::Ready(instance);
                }
                let pending = start();
                if let Some(weak) = pending.downgrade() {
                    entry.insert(weak);
                }
                SharedSlot::Pending(pending)
            }
        }
    }

    /// Record a finished construction and release its in-flight slot.
    ///
    /// Returns the instance that is now cached. If one was already cached
    /// the earlier instance wins.
    pub fn store_shared(&self, name: &str, instance: Instance) -> Instance {
        let stored = self
            .shared
            .entry(name.to_owned())
            .or_insert(instance)
            .clone();
        self.resolving.remove(name);
        stored
    }

    /// Release the in-flight slot of a failed construction so the next
    /// `make` retries the factory.
    #[inline]
    pub fn abandon(&self, name: &str) {
        self.resolving.remove(name);
    }

    /// Check if a live construction is in flight
    #[cfg(test)]
    pub fn is_resolving(&self, name: &str) -> bool {
        self.resolving
            .get(name)
            .is_some_and(|weak| weak.upgrade().is_some())
    }

    /// Get number of bindings
    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no bindings exist
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Get number of cached shared instances
    #[inline]
    pub fn shared_len(&self) -> usize {
        self.shared.len()
    }
}

impl Default for ServiceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceStorage")
            .field("bindings", &self.len())
            .field("shared", &self.shared_len())
            .field("resolving", &self.resolving.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{self, FutureExt};
    use std::sync::Arc;

    fn value_binding(value: u32) -> Binding {
        Binding::from_fn(move |_| Ok(value), true)
    }

    fn pending(value: u32) -> PendingInstance {
        future::ready(Ok(Arc::new(value) as Instance)).boxed().shared()
    }

    #[test]
    fn test_bind_reports_replacement() {
        let storage = ServiceStorage::new();

        assert!(!storage.bind("port".into(), value_binding(80)));
        assert!(storage.bind("port".into(), value_binding(8080)));
        assert_eq!(storage.len(), 1);
        assert!(storage.is_bound("port"));
        assert!(!storage.is_bound("host"));
    }

    #[test]
    fn test_is_bound_all() {
        let storage = ServiceStorage::new();
        storage.bind("a".into(), value_binding(1));

        assert!(storage.is_bound_all(&["a".to_string()]));
        assert!(!storage.is_bound_all(&["a".to_string(), "b".to_string()]));
        assert!(storage.is_bound_all(&[]));
    }

    #[test]
    fn test_shared_slot_starts_once() {
        let storage = ServiceStorage::new();
        let mut starts = 0;

        let first = storage.shared_slot("a", || {
            starts += 1;
            pending(1)
        });
        assert!(matches!(first, SharedSlot::Pending(_)));
        assert!(storage.is_resolving("a"));

        let second = storage.shared_slot("a", || {
            starts += 1;
            pending(2)
        });
        assert!(matches!(second, SharedSlot::Pending(_)));
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_store_shared_releases_slot() {
        let storage = ServiceStorage::new();
        let _slot = storage.shared_slot("a", || pending(1));
        assert!(storage.is_resolving("a"));

        let stored = storage.store_shared("a", Arc::new(1u32));

        assert!(!storage.is_resolving("a"));
        assert_eq!(storage.shared_len(), 1);
        match storage.shared_slot("a", || unreachable!("cached")) {
            SharedSlot::Ready(instance) => assert!(Arc::ptr_eq(&instance, &stored)),
            SharedSlot::Pending(_) => panic!("expected cached instance"),
        }
    }

    #[test]
    fn test_first_stored_instance_wins() {
        let storage = ServiceStorage::new();

        let first = storage.store_shared("a", Arc::new(1u32));
        let second = storage.store_shared("a", Arc::new(2u32));

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_abandon_allows_restart() {
        let storage = ServiceStorage::new();
        let _slot = storage.shared_slot("a", || pending(1));

        storage.abandon("a");
        assert!(!storage.is_resolving("a"));

        let mut restarted = false;
        let _ = storage.shared_slot("a", || {
            restarted = true;
            pending(1)
        });
        assert!(restarted);
    }

    #[test]
    fn test_dropped_construction_is_restarted() {
        let storage = ServiceStorage::new();

        let slot = storage.shared_slot("a", || pending(1));
        drop(slot);
        assert!(!storage.is_resolving("a"));

        let mut restarted = false;
        let _slot = storage.shared_slot("a", || {
            restarted = true;
            pending(2)
        });
        assert!(restarted);
        assert!(storage.is_resolving("a"));
    }

    #[test]
    fn test_in_flight_table_does_not_own_construction() {
        struct Guard(Arc<std::sync::atomic::AtomicBool>);

        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let storage = ServiceStorage::new();
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let guard = Guard(Arc::clone(&dropped));

        let slot = storage.shared_slot("a", move || {
            async move {
                let _guard = guard;
                Ok(Arc::new(1u32) as Instance)
            }
            .boxed()
            .shared()
        });
        assert!(!dropped.load(std::sync::atomic::Ordering::SeqCst));

        drop(slot);
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }
}
