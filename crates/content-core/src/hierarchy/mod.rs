//! Caching Hierarchy Manager (spec §4.2): the shared, workspace-wide path
//! and id resolution cache plus event-driven invalidation.

pub mod cache;
pub mod events;
pub mod zombie;

use crate::{id::NodeId, path::Path, Result};

pub use cache::HierarchyCache;
pub use events::InvalidationEvent;
pub use zombie::ZombieIndex;

/// Resolves between content paths and node ids, backed by a cache and a
/// fallback to the persistent store on miss. Implemented by
/// `workspace::WorkspaceCoordinator`, which owns the authoritative
/// parent/child structure; this trait lets `itemmgr` depend only on the
/// capability it needs.
pub trait HierarchyManager: Send + Sync {
    fn resolve_path(&self, path: &Path) -> Result<NodeId>;
    fn resolve_id(&self, node: NodeId) -> Result<Path>;
}

/// A `HierarchyManager` that consults a cache first and only calls into
/// `resolve_miss`/`reverse_miss` on cold lookups, recording the result.
pub struct CachingHierarchyManager<F, G> {
    cache: HierarchyCache,
    zombies: ZombieIndex,
    resolve_miss: F,
    reverse_miss: G,
}

impl<F, G> CachingHierarchyManager<F, G>
where
    F: Fn(&Path) -> Result<NodeId>,
    G: Fn(NodeId) -> Result<Path>,
{
    pub fn new(capacity: usize, resolve_miss: F, reverse_miss: G) -> Self {
        Self {
            cache: HierarchyCache::new(capacity),
            zombies: ZombieIndex::default(),
            resolve_miss,
            reverse_miss,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &HierarchyCache {
        &self.cache
    }

    #[must_use]
    pub fn zombies(&self) -> &ZombieIndex {
        &self.zombies
    }

    pub fn invalidate(&self, event: &InvalidationEvent) {
        self.cache.apply(event);
    }
}

impl<F, G> HierarchyManager for CachingHierarchyManager<F, G>
where
    F: Fn(&Path) -> Result<NodeId> + Send + Sync,
    G: Fn(NodeId) -> Result<Path> + Send + Sync,
{
    fn resolve_path(&self, path: &Path) -> Result<NodeId> {
        if let Some(id) = self.cache.lookup_by_path(path) {
            return Ok(id);
        }
        let id = (self.resolve_miss)(path)?;
        self.cache.insert(path.clone(), id);
        Ok(id)
    }

    fn resolve_id(&self, node: NodeId) -> Result<Path> {
        if let Some(path) = self.cache.lookup_by_id(node) {
            return Ok(path);
        }
        if let Some(path) = self.zombies.lookup(node) {
            return Ok(path);
        }
        let path = (self.reverse_miss)(node)?;
        self.cache.insert(path.clone(), node);
        Ok(path)
    }
}
