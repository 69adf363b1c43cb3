//! The change-feed polling worker and its listener registry (spec §4.5
//! "Change feed" / "Listeners"). Mirrors the explicit handle-table pattern
//! of `itemmgr::listener::ListenerRegistry`, but for `RepositoryEvent`
//! rather than `LifecycleEvent`, since the two dispatch to disjoint
//! subscriber sets (hierarchy cache + node-type registry here, façade
//! cache there).

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, error, instrument};

use super::service::{RepositoryEvent, RepositoryService, SessionInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type Listener = Box<dyn Fn(&RepositoryEvent) + Send + Sync>;

/// Owns the set of internal listeners (hierarchy invalidation, node-type
/// registry coherence, per-session lock listeners) that the poll worker
/// fans events out to. If the set is empty the worker waits on `non_empty`
/// instead of busy-polling (spec §4.5: "if the listener set is empty, the
/// poll worker waits on a condition variable").
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    listeners: DashMap<ListenerHandle, Listener>,
    non_empty: Notify,
}

impl EventRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&RepositoryEvent) + Send + Sync + 'static,
    {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(handle, Box::new(listener));
        self.non_empty.notify_waiters();
        handle
    }

    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(&handle).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Suspend until a listener is registered, if none are yet.
    pub async fn wait_for_subscriber(&self) {
        if !self.is_empty() {
            return;
        }
        self.non_empty.notified().await;
    }

    /// Fan `event` out to every registered listener. A panicking listener
    /// is caught and logged (spec §7: "Listener callbacks must not throw;
    /// exceptions are logged and swallowed to preserve ordering").
    pub fn dispatch(&self, event: &RepositoryEvent) {
        for entry in &self.listeners {
            let listener = entry.value();
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(handle = ?entry.key(), "change-feed listener panicked, continuing dispatch");
            }
        }
    }
}

/// Handle to a spawned polling task; dropping it does not stop the task,
/// call `stop` (the cooperative analogue of "thread interruption").
pub struct PollWorker {
    stop: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl PollWorker {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.abort();
    }
}

/// Spawn the dedicated change-polling worker (spec §4.5 "Change feed"):
/// loop snapshotting listener filters, call `getEvents`, and on a bundle
/// acquire the update mutex, fan out, release. `filter_id` must already
/// have been obtained from `service.create_event_filter` by the caller,
/// since that call is itself async and this constructor is not.
pub fn spawn_poll_worker<S>(
    service: Arc<S>,
    session: SessionInfo,
    filter_id: u64,
    registry: Arc<EventRegistry>,
    update_mutex: Arc<tokio::sync::Mutex<()>>,
    poll_timeout_ms: u64,
) -> PollWorker
where
    S: RepositoryService + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_task = stop.clone();

    let handle = tokio::spawn(async move {
        while !stop_for_task.load(Ordering::Relaxed) {
            registry.wait_for_subscriber().await;
            if stop_for_task.load(Ordering::Relaxed) {
                break;
            }
            match service.get_events(&session, poll_timeout_ms, &[filter_id]).await {
                Ok(bundle) if !bundle.events.is_empty() => {
                    let _guard = update_mutex.lock().await;
                    debug!(count = bundle.events.len(), "dispatching change-feed bundle");
                    for event in &bundle.events {
                        registry.dispatch(event);
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    error!(%error, "change-feed poll failed, retrying");
                }
            }
        }
    });

    PollWorker { stop, handle }
}

#[instrument(skip(cache))]
pub fn apply_to_hierarchy_cache(cache: &crate::hierarchy::HierarchyCache, event: &RepositoryEvent) {
    use crate::hierarchy::InvalidationEvent;
    let invalidation = match event {
        RepositoryEvent::NodeAdded { child, .. } => InvalidationEvent::StateOverlaid { node: *child },
        RepositoryEvent::NodeRemoved { child, parent, .. } => {
            InvalidationEvent::NodeRemoved { node: *child, path: cache.lookup_by_id(*parent).unwrap_or_else(crate::path::Path::root) }
        }
        RepositoryEvent::NodesReplaced { parent } => InvalidationEvent::NodesReplaced { parent: *parent },
        RepositoryEvent::PropertyChanged { id } => InvalidationEvent::StateModified { node: id.parent() },
        RepositoryEvent::StateDestroyed { node } => InvalidationEvent::StateDestroyed { node: *node },
    };
    cache.apply(&invalidation);
}
