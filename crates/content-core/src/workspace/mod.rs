//! Workspace Coordinator (spec §4.5): mediates between client-issued
//! operations and the asynchronous change feed, dispatches to the
//! Repository Service, and is the concrete collaborator that
//! `state::ItemStateManager` and `itemmgr`/`hierarchy` depend on through
//! their narrow traits.

pub mod feed;
pub mod lock;
pub mod service;
pub mod version;

use std::{fmt, str::FromStr, sync::{Arc, Mutex as StdMutex}};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    hierarchy::{HierarchyCache, HierarchyManager, InvalidationEvent, ZombieIndex},
    id::{ItemId, NodeId},
    path::{Path, PathElement},
    state::{ChangeLog, manager::ChangeLogSubmitter},
    Error, Result,
};

pub use feed::{EventRegistry, ListenerHandle, PollWorker};
pub use lock::LockManager;
pub use service::{LockInfo, RepositoryEvent, RepositoryService, SessionInfo};
pub use version::{InMemoryVersionManager, NoopVersionManager, VersionManager};

/// The Coordinator reads this from configuration at construction (spec §6
/// "Environment / config"): whether the caching hierarchy relies purely on
/// event-driven invalidation, or additionally polls the backing store's
/// observation feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBehaviour {
    #[default]
    Invalidate,
    Observation,
}

impl fmt::Display for CacheBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalidate => write!(f, "invalidate"),
            Self::Observation => write!(f, "observation"),
        }
    }
}

impl FromStr for CacheBehaviour {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "invalidate" => Ok(Self::Invalidate),
            "observation" => Ok(Self::Observation),
            _ => Err(Error::InvalidConfig(format!(
                "invalid cache behaviour: {s}. Must be one of: invalidate, observation"
            ))),
        }
    }
}

/// Bridges this crate's sync trait boundaries (`ChangeLogSubmitter`,
/// `HierarchyManager`) to an async `RepositoryService`. Used only at this
/// one seam: everything above `workspace` stays synchronous, matching the
/// Item State Layer and Hierarchy Manager's own (sync) contracts.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    futures::executor::block_on(future)
}

/// Owns the update mutex, the change-feed poll worker, and the lock
/// manager for one session's view of a workspace (spec §4.5).
pub struct WorkspaceCoordinator<S: RepositoryService> {
    service: Arc<S>,
    session: SessionInfo,
    update_mutex: Arc<tokio::sync::Mutex<()>>,
    registry: Arc<EventRegistry>,
    poll_worker: StdMutex<Option<PollWorker>>,
    lock_manager: LockManager<S>,
    version_manager: Arc<dyn VersionManager>,
    cache_behaviour: CacheBehaviour,
    cache: Arc<HierarchyCache>,
    zombies: ZombieIndex,
}

impl<S: RepositoryService + 'static> WorkspaceCoordinator<S> {
    /// Construct a coordinator for an already-opened session. If
    /// `cache_behaviour` requests observation and the service advertises
    /// support for it, spawns the change-polling worker immediately (spec
    /// §4.5: "On construction, if the backing store advertises observation
    /// support, the Coordinator spawns a dedicated change-polling worker")
    /// and registers a listener that feeds every delivered bundle into the
    /// path/id cache (spec §4.2's event-driven invalidation rules).
    pub async fn new(
        service: Arc<S>,
        session: SessionInfo,
        cache_behaviour: CacheBehaviour,
        poll_timeout_ms: u64,
        version_manager: Arc<dyn VersionManager>,
        hierarchy_cache_capacity: usize,
    ) -> Result<Self> {
        let registry = Arc::new(EventRegistry::new());
        let update_mutex = Arc::new(tokio::sync::Mutex::new(()));
        let cache = Arc::new(HierarchyCache::new(hierarchy_cache_capacity));
        let wants_observation = cache_behaviour == CacheBehaviour::Observation;
        let poll_worker = if wants_observation && service.supports_observation().await {
            let filter_id = service.create_event_filter(&session, service::EventFilter::default()).await?;
            let cache_for_listener = cache.clone();
            registry.register(move |event| feed::apply_to_hierarchy_cache(&cache_for_listener, event));
            Some(feed::spawn_poll_worker(
                service.clone(),
                session.clone(),
                filter_id,
                registry.clone(),
                update_mutex.clone(),
                poll_timeout_ms,
            ))
        } else {
            None
        };
        Ok(Self {
            lock_manager: LockManager::new(service.clone()),
            service,
            session,
            update_mutex,
            registry,
            poll_worker: StdMutex::new(poll_worker),
            version_manager,
            cache_behaviour,
            cache,
            zombies: ZombieIndex::new(),
        })
    }

    #[must_use]
    pub fn hierarchy_cache(&self) -> &Arc<HierarchyCache> {
        &self.cache
    }

    /// Retain `node`'s last-known path before a session-local removal takes
    /// it out of normal resolution, so `resolve_id_including_removed` keeps
    /// answering for it until the removal is finalized or undone (spec §4.2
    /// "include-removed (zombie)" mode).
    pub fn retain_zombie(&self, node: NodeId, path: Path) {
        self.zombies.retain(node, path);
    }

    /// Release every retained zombie entry for this session. Called at
    /// save/undo boundaries, which settle transient state for a whole
    /// subtree at once.
    pub fn clear_zombies(&self) {
        self.zombies.clear();
    }

    /// `resolvePath`/`getPath` in *include-removed* mode (spec §4.2): falls
    /// back to the zombie index when the ordinary lookup reports the item
    /// missing, so a session can still report `getPath()` for a node it has
    /// only just removed transiently.
    pub fn resolve_id_including_removed(&self, node: NodeId) -> Result<Path> {
        match self.resolve_id(node) {
            Ok(path) => Ok(path),
            Err(e) => self.zombies.lookup(node).ok_or(e),
        }
    }

    #[must_use]
    pub const fn cache_behaviour(&self) -> CacheBehaviour {
        self.cache_behaviour
    }

    #[must_use]
    pub const fn session_info(&self) -> &SessionInfo {
        &self.session
    }

    #[must_use]
    pub fn event_registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn lock_manager(&self) -> &LockManager<S> {
        &self.lock_manager
    }

    #[must_use]
    pub fn version_manager(&self) -> &Arc<dyn VersionManager> {
        &self.version_manager
    }

    pub fn stop_polling(&self) {
        if let Some(worker) = self.poll_worker.lock().expect("poll worker mutex poisoned").take() {
            worker.stop();
        }
    }

    async fn node_info(&self, node: NodeId) -> Result<service::NodeInfo> {
        self.service.get_node_info(&self.session, node).await
    }

    /// Fetch the persistent snapshot of an item (spec §6 `getItemInfo`),
    /// used by `Session` to populate the transient overlay on first touch.
    pub fn item_info(&self, id: &ItemId) -> Result<service::ItemInfo> {
        block_on(self.service.get_item_info(&self.session, id))
    }

    async fn resolve_path_async(&self, path: &Path) -> Result<NodeId> {
        let mut current = NodeId::root();
        if path.is_root() {
            return Ok(current);
        }
        for element in path.elements() {
            let children = self.service.get_child_infos(&self.session, current).await?;
            let found = children
                .into_iter()
                .find(|c| &c.name == element.name() && c.index == element.index())
                .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
            current = found.id;
        }
        Ok(current)
    }

    async fn resolve_id_async(&self, node: NodeId) -> Result<Path> {
        if node.is_root() {
            return Ok(Path::root());
        }
        let mut builder = crate::path::PathBuilder::new();
        let mut current = node;
        loop {
            let info = self.node_info(current).await?;
            let Some(parent) = info.parent_id else { break };
            let siblings = self.service.get_child_infos(&self.session, parent).await?;
            let entry = siblings
                .into_iter()
                .find(|c| c.id == current)
                .ok_or_else(|| Error::ItemNotFound(current.to_string()))?;
            builder.prepend(PathElement::new(entry.name, entry.index));
            current = parent;
        }
        Ok(builder.build())
    }

    /// Build the ancestor chain (root-to-parent, exclusive of `node`
    /// itself) used by `LockManager::resolve`'s deep-lock walk.
    async fn ancestry_of(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let mut ancestors = Vec::new();
        let mut current = node;
        loop {
            let info = self.node_info(current).await?;
            let Some(parent) = info.parent_id else { break };
            ancestors.push(parent);
            current = parent;
        }
        ancestors.reverse();
        Ok(ancestors)
    }

    /// `checkLock(node)` (spec §4.5).
    #[instrument(skip(self))]
    pub fn check_lock(&self, node: NodeId) -> Result<()> {
        block_on(async {
            let ancestry = self.ancestry_of(node).await?;
            self.lock_manager.check_lock(&self.session, &ancestry, node).await
        })
    }

    /// `checkPermission(path, actions)` (spec §4.5): walks the nearest
    /// existing ancestor for non-existing paths.
    pub fn check_permission(&self, path: &Path, actions: &[String]) -> Result<bool> {
        block_on(lock::check_permission(
            &*self.service,
            &self.session,
            |p| block_on(self.resolve_path_async(p)).ok(),
            path,
            actions,
        ))
    }

    pub fn lock(&self, node: NodeId, is_deep: bool, is_session_scoped: bool) -> Result<LockInfo> {
        block_on(async {
            let info = self.service.lock(&self.session, node, is_deep, is_session_scoped).await?;
            self.lock_manager.add_lock_token(node, info.clone());
            Ok(info)
        })
    }

    pub fn unlock(&self, node: NodeId) -> Result<()> {
        block_on(async {
            self.service.unlock(&self.session, node).await?;
            let _ = self.lock_manager.remove_lock_token(node);
            Ok(())
        })
    }

    pub fn checkin(&self, node: NodeId) -> Result<String> {
        self.version_manager.checkin(node)
    }

    pub fn checkout(&self, node: NodeId) -> Result<()> {
        self.version_manager.checkout(node)
    }

    pub fn restore(&self, node: NodeId, version_label: &str) -> Result<()> {
        self.version_manager.restore(node, version_label)
    }

    pub fn register_namespace(&self, prefix: &str, uri: &str) -> Result<()> {
        block_on(self.service.register_namespace(&self.session, prefix, uri))
    }

    pub fn unregister_namespace(&self, prefix: &str) -> Result<()> {
        block_on(self.service.unregister_namespace(&self.session, prefix))
    }
}

impl<S: RepositoryService + 'static> ChangeLogSubmitter for WorkspaceCoordinator<S> {
    /// Execute under the binary, non-reentrant update mutex (spec §4.5:
    /// "While held, event delivery to listeners is blocked"). A batch is
    /// opened, the whole ordered log handed to `submit` in one call, and on
    /// success the lock is released for the poll worker to resume.
    #[instrument(skip(self, log))]
    fn submit(&self, log: &ChangeLog) -> Result<()> {
        block_on(async {
            let _guard = self.update_mutex.lock().await;
            let batch = self.service.create_batch(&self.session, log.target()).await?;
            self.service.submit(&self.session, batch, log).await
        })?;
        // The just-submitted log may have added, removed, or reordered
        // children anywhere under its target; the cheapest correct thing a
        // cache with no path-prefix index can do is drop everything it
        // remembers at or below that target (spec §4.2 `nodesReplaced`).
        self.cache.apply(&InvalidationEvent::NodesReplaced { parent: log.target() });
        Ok(())
    }
}

impl<S: RepositoryService + 'static> HierarchyManager for WorkspaceCoordinator<S> {
    fn resolve_path(&self, path: &Path) -> Result<NodeId> {
        if let Some(id) = self.cache.lookup_by_path(path) {
            return Ok(id);
        }
        let id = block_on(self.resolve_path_async(path))?;
        self.cache.insert(path.clone(), id);
        Ok(id)
    }

    fn resolve_id(&self, node: NodeId) -> Result<Path> {
        if let Some(path) = self.cache.lookup_by_id(node) {
            return Ok(path);
        }
        let path = block_on(self.resolve_id_async(node))?;
        self.cache.insert(path.clone(), node);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        names::QName,
        state::{ChangeLog, Operation},
        workspace::service::mock::MockRepositoryService,
    };

    async fn coordinator() -> WorkspaceCoordinator<MockRepositoryService> {
        let service = Arc::new(MockRepositoryService::with_root());
        let session = SessionInfo { session_id: "s".into(), workspace_name: "default".into() };
        WorkspaceCoordinator::new(service, session, CacheBehaviour::Invalidate, 1000, Arc::new(NoopVersionManager), 10_000)
            .await
            .expect("coordinator constructs")
    }

    #[tokio::test]
    async fn submit_applies_add_node_and_resolve_path_sees_it() {
        let coordinator = coordinator().await;
        let new_id = NodeId::new();
        let mut log = ChangeLog::new(NodeId::root());
        log.push(Operation::AddNode {
            parent: NodeId::root(),
            name: QName::unprefixed("a"),
            primary_type: QName::unprefixed("nt:base"),
            new_id,
        });
        coordinator.submit(&log).expect("submit succeeds");

        let path = Path::root().child(PathElement::new(QName::unprefixed("a"), 1));
        assert_eq!(coordinator.resolve_path(&path).expect("resolves"), new_id);
        assert_eq!(coordinator.resolve_id(new_id).expect("reverse resolves"), path);
    }

    #[tokio::test]
    async fn submit_failure_does_not_panic_and_surfaces_repository_error() {
        let service = Arc::new(MockRepositoryService { fail_after: Some(0), ..MockRepositoryService::with_root() });
        let session = SessionInfo { session_id: "s".into(), workspace_name: "default".into() };
        let coordinator = WorkspaceCoordinator::new(service, session, CacheBehaviour::Invalidate, 1000, Arc::new(NoopVersionManager), 10_000)
            .await
            .expect("constructs");
        let mut log = ChangeLog::new(NodeId::root());
        log.push(Operation::AddNode {
            parent: NodeId::root(),
            name: QName::unprefixed("a"),
            primary_type: QName::unprefixed("nt:base"),
            new_id: NodeId::new(),
        });
        let result = coordinator.submit(&log);
        assert!(matches!(result, Err(Error::RepositoryError(_))));
    }

    #[tokio::test]
    async fn lock_then_check_lock_then_unlock() {
        let coordinator = coordinator().await;
        assert!(coordinator.check_lock(NodeId::root()).is_ok());
        coordinator.lock(NodeId::root(), true, true).expect("lock");
        assert!(coordinator.check_lock(NodeId::root()).is_ok(), "holder is not blocked by its own lock");
        coordinator.unlock(NodeId::root()).expect("unlock");
    }

    #[tokio::test]
    async fn a_resolved_path_is_served_from_cache_without_a_second_fetch() {
        let coordinator = coordinator().await;
        let new_id = NodeId::new();
        let mut log = ChangeLog::new(NodeId::root());
        log.push(Operation::AddNode {
            parent: NodeId::root(),
            name: QName::unprefixed("a"),
            primary_type: QName::unprefixed("nt:base"),
            new_id,
        });
        coordinator.submit(&log).expect("submit succeeds");
        let path = Path::root().child(PathElement::new(QName::unprefixed("a"), 1));
        assert_eq!(coordinator.resolve_path(&path).expect("first resolve populates the cache"), new_id);

        // Drop the node from the backing store directly, bypassing the
        // coordinator, so a second *uncached* resolve would fail.
        coordinator.service.nodes.remove(&new_id);
        if let Some(mut root) = coordinator.service.nodes.get_mut(&NodeId::root()) {
            root.child_entries.clear();
        }

        assert_eq!(
            coordinator.resolve_path(&path).expect("served from cache, not re-fetched"),
            new_id
        );
        assert_eq!(coordinator.resolve_id(new_id).expect("reverse lookup also served from cache"), path);
    }

    #[tokio::test]
    async fn resolve_id_including_removed_falls_back_to_a_retained_zombie_path() {
        let coordinator = coordinator().await;
        let new_id = NodeId::new();
        let mut log = ChangeLog::new(NodeId::root());
        log.push(Operation::AddNode {
            parent: NodeId::root(),
            name: QName::unprefixed("a"),
            primary_type: QName::unprefixed("nt:base"),
            new_id,
        });
        coordinator.submit(&log).expect("submit succeeds");
        let path = Path::root().child(PathElement::new(QName::unprefixed("a"), 1));
        coordinator.retain_zombie(new_id, path.clone());

        // Drop the node from the backing store and its cache entry, as a
        // finalized removal would, so ordinary resolution fails.
        coordinator.cache.apply(&InvalidationEvent::NodesReplaced { parent: NodeId::root() });
        coordinator.service.nodes.remove(&new_id);
        if let Some(mut root) = coordinator.service.nodes.get_mut(&NodeId::root()) {
            root.child_entries.clear();
        }

        assert!(coordinator.resolve_id(new_id).is_err(), "ordinary resolution no longer finds it");
        assert_eq!(
            coordinator.resolve_id_including_removed(new_id).expect("zombie fallback still answers"),
            path
        );

        coordinator.clear_zombies();
        assert!(
            coordinator.resolve_id_including_removed(new_id).is_err(),
            "cleared zombie no longer answers either"
        );
    }

    /// Spec §8 S4: an externally observed move is fanned out through the
    /// change feed and invalidates the cached path, without the client ever
    /// calling into the coordinator directly.
    ///
    /// Multi-threaded so the poll worker's busy-poll loop (the mock service
    /// never actually sleeps for `poll_timeout_ms`) runs on its own worker
    /// thread instead of starving this test's own task of scheduler time.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn external_move_event_invalidates_the_cached_path() {
        let service = Arc::new(MockRepositoryService { observation_supported: true, ..MockRepositoryService::with_root() });
        let a = NodeId::new();
        let c = NodeId::new();
        let b = NodeId::new();
        service.nodes.insert(a, service::NodeInfo {
            id: a,
            parent_id: Some(NodeId::root()),
            primary_type: QName::unprefixed("nt:base"),
            mixin_types: vec![],
            property_names: vec![],
            child_entries: vec![service::ChildInfo { name: QName::unprefixed("b"), index: 1, id: b }],
        });
        service.nodes.insert(c, service::NodeInfo {
            id: c,
            parent_id: Some(NodeId::root()),
            primary_type: QName::unprefixed("nt:base"),
            mixin_types: vec![],
            property_names: vec![],
            child_entries: vec![],
        });
        service.nodes.insert(b, service::NodeInfo {
            id: b,
            parent_id: Some(a),
            primary_type: QName::unprefixed("nt:base"),
            mixin_types: vec![],
            property_names: vec![],
            child_entries: vec![],
        });
        if let Some(mut root) = service.nodes.get_mut(&NodeId::root()) {
            root.child_entries.push(service::ChildInfo { name: QName::unprefixed("a"), index: 1, id: a });
            root.child_entries.push(service::ChildInfo { name: QName::unprefixed("c"), index: 1, id: c });
        }

        let session = SessionInfo { session_id: "s".into(), workspace_name: "default".into() };
        let coordinator = WorkspaceCoordinator::new(
            service.clone(),
            session,
            CacheBehaviour::Observation,
            50,
            Arc::new(NoopVersionManager),
            10_000,
        )
        .await
        .expect("constructs");

        let path_a = Path::root().child(PathElement::new(QName::unprefixed("a"), 1));
        let path_ab = path_a.child(PathElement::new(QName::unprefixed("b"), 1));
        assert_eq!(coordinator.resolve_path(&path_ab).expect("resolves and caches"), b);

        // External mutation: move b from a to c, and tell the coordinator
        // about it only via the change feed, the way an independent session
        // acting on the same workspace would.
        if let Some(mut a_node) = service.nodes.get_mut(&a) {
            a_node.child_entries.clear();
        }
        if let Some(mut c_node) = service.nodes.get_mut(&c) {
            c_node.child_entries.push(service::ChildInfo { name: QName::unprefixed("b"), index: 1, id: b });
        }
        if let Some(mut b_node) = service.nodes.get_mut(&b) {
            b_node.parent_id = Some(c);
        }
        service.push_event(RepositoryEvent::NodeRemoved { parent: a, name: QName::unprefixed("b"), index: 1, child: b });
        service.push_event(RepositoryEvent::NodeAdded { parent: c, name: QName::unprefixed("b"), index: 1, child: b });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(coordinator.hierarchy_cache().lookup_by_path(&path_ab), None, "stale path was invalidated");
        let path_c = Path::root().child(PathElement::new(QName::unprefixed("c"), 1));
        let path_cb = path_c.child(PathElement::new(QName::unprefixed("b"), 1));
        assert_eq!(coordinator.resolve_path(&path_cb).expect("resolves at the new location"), b);
    }
}
