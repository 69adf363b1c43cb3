//! The capacity-bounded, bidirectional id/path LRU cache (spec §4.2).

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::{id::NodeId, path::Path};

use super::events::InvalidationEvent;

const DEFAULT_CAPACITY: usize = 10_000;

struct Inner {
    by_path: LruCache<Path, NodeId>,
    by_id: LruCache<NodeId, Path>,
}

/// Caches `path -> NodeId` and `NodeId -> path` lookups with LRU eviction,
/// invalidated by structural events rather than a TTL (spec §4.2: "entries
/// are correct until told otherwise, not until they expire").
pub struct HierarchyCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl HierarchyCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("max(1) is never zero");
        Self {
            inner: Mutex::new(Inner {
                by_path: LruCache::new(cap),
                by_id: LruCache::new(cap),
            }),
            capacity: cap.get(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a resolved mapping.
    pub fn insert(&self, path: Path, node: NodeId) {
        let mut inner = self.inner.lock();
        inner.by_path.put(path.clone(), node);
        inner.by_id.put(node, path);
    }

    #[must_use]
    pub fn lookup_by_path(&self, path: &Path) -> Option<NodeId> {
        self.inner.lock().by_path.get(path).copied()
    }

    #[must_use]
    pub fn lookup_by_id(&self, node: NodeId) -> Option<Path> {
        self.inner.lock().by_id.get(&node).cloned()
    }

    fn evict_node(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        if let Some(path) = inner.by_id.pop(&node) {
            inner.by_path.pop(&path);
        }
    }

    /// Evict every cached entry at or below `prefix` (used for subtree
    /// invalidation, since the cache has no index from path-prefix to
    /// entries and must scan).
    fn evict_subtree(&self, prefix: &Path) {
        let mut inner = self.inner.lock();
        let stale: Vec<Path> = inner
            .by_path
            .iter()
            .filter(|(path, _)| prefix.is_ancestor_of(path))
            .map(|(path, _)| path.clone())
            .collect();
        for path in stale {
            if let Some(node) = inner.by_path.pop(&path) {
                inner.by_id.pop(&node);
            }
        }
    }

    /// Apply an invalidation event, dropping whatever cached state it
    /// makes stale (spec §4.2 event-driven invalidation).
    pub fn apply(&self, event: &InvalidationEvent) {
        let subject = event.subject();
        if event.invalidates_subtree() {
            if let Some(path) = self.lookup_by_id(subject) {
                debug!(%subject, %path, "invalidating cached subtree");
                self.evict_subtree(&path);
            } else {
                // Unknown path: fall back to evicting just the one entry.
                self.evict_node(subject);
            }
        } else {
            self.evict_node(subject);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().by_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_path.clear();
        inner.by_id.clear();
    }
}

impl Default for HierarchyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{names::QName, path::PathElement};

    fn path(name: &str) -> Path {
        Path::root().child(PathElement::new(QName::unprefixed(name), 1))
    }

    #[test]
    fn insert_and_lookup_round_trip() {
        let cache = HierarchyCache::new(4);
        let node = NodeId::new();
        cache.insert(path("a"), node);
        assert_eq!(cache.lookup_by_path(&path("a")), Some(node));
        assert_eq!(cache.lookup_by_id(node), Some(path("a")));
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = HierarchyCache::new(1);
        let first = NodeId::new();
        let second = NodeId::new();
        cache.insert(path("a"), first);
        cache.insert(path("b"), second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup_by_path(&path("a")), None);
        assert_eq!(cache.lookup_by_path(&path("b")), Some(second));
    }

    #[test]
    fn node_removed_event_evicts_subtree() {
        let cache = HierarchyCache::new(8);
        let parent = NodeId::new();
        let child_node = NodeId::new();
        let parent_path = path("a");
        let child_path = parent_path.child(PathElement::new(QName::unprefixed("b"), 1));
        cache.insert(parent_path.clone(), parent);
        cache.insert(child_path.clone(), child_node);

        cache.apply(&InvalidationEvent::NodeRemoved { node: parent, path: parent_path.clone() });

        assert_eq!(cache.lookup_by_path(&parent_path), None);
        assert_eq!(cache.lookup_by_path(&child_path), None);
    }

    #[test]
    fn state_modified_event_evicts_only_the_one_entry() {
        let cache = HierarchyCache::new(8);
        let node = NodeId::new();
        cache.insert(path("a"), node);
        cache.apply(&InvalidationEvent::StateModified { node });
        assert_eq!(cache.lookup_by_path(&path("a")), None);
    }
}
