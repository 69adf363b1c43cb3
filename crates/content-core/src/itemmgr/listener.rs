//! Lifecycle listener handle table (Design Notes §9: "replace
//! listener-chains kept via weak references with an explicit handle table
//! owned by the manager that fires them" — registration returns a handle
//! the caller must hold onto, rather than the manager silently dropping a
//! listener once its last strong reference elsewhere disappears).

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tracing::error;

use crate::id::ItemId;

/// A lifecycle notification fired by the Item Manager (spec §4.3).
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Created(ItemId),
    Modified(ItemId),
    Removed(ItemId),
}

/// Opaque handle returned by [`ListenerRegistry::register`]. Dropping the
/// handle does *not* unregister the listener: call
/// [`ListenerRegistry::unregister`] explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type Listener = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Owns the live set of lifecycle listeners and dispatches events to them.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: DashMap<ListenerHandle, Listener>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(handle, Box::new(listener));
        handle
    }

    /// Remove a listener. Returns `false` if the handle was already
    /// unregistered (not an error: `unregister` is permitted without a
    /// mandated scan of pending content referencing the listener, see
    /// `DESIGN.md`).
    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(&handle).is_some()
    }

    /// Fire `event` to every registered listener. A panicking listener is
    /// caught and logged; it does not prevent delivery to the others and
    /// does not unregister the listener.
    pub fn notify(&self, event: &LifecycleEvent) {
        for entry in &self.listeners {
            let listener = entry.value();
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                error!(handle = ?entry.key(), "lifecycle listener panicked, continuing dispatch");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
