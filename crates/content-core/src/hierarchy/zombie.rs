//! The "including-removed" derived manager (spec §4.2: a session needs to
//! resolve paths for items it has just removed transiently, e.g. to report
//! `getPath()` on a state still in `ExistingRemoved`, until `save`/`undo`
//! settles it). Rather than special-casing removed items in the main
//! cache, this wraps it with a small side table that outlives the main
//! eviction policy for exactly the entries the session is watching.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{id::NodeId, path::Path};

/// A read-through view over a [`super::cache::HierarchyCache`] that also
/// answers for nodes the cache has already evicted because they were
/// removed, as long as the caller explicitly retained them here first.
#[derive(Default)]
pub struct ZombieIndex {
    retained: RwLock<HashMap<NodeId, Path>>,
}

impl ZombieIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain a node's last-known path before it drops out of the live
    /// cache, so `getPath` keeps answering for it through the remainder of
    /// the removing transaction.
    pub fn retain(&self, node: NodeId, path: Path) {
        self.retained.write().insert(node, path);
    }

    #[must_use]
    pub fn lookup(&self, node: NodeId) -> Option<Path> {
        self.retained.read().get(&node).cloned()
    }

    /// Drop a retained entry once the removal is finalized (`save`) or
    /// reverted (`undo`) and the node either no longer exists or is live
    /// again in the main cache.
    pub fn release(&self, node: NodeId) {
        self.retained.write().remove(&node);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.retained.read().is_empty()
    }

    /// Drop every retained entry. Used at save/undo boundaries, which settle
    /// an entire subtree at once rather than one node at a time, so there is
    /// no finer-grained release point to call instead.
    pub fn clear(&self) {
        self.retained.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{names::QName, path::PathElement};

    #[test]
    fn retained_entry_survives_after_release_of_others() {
        let index = ZombieIndex::new();
        let node = NodeId::new();
        let path = Path::root().child(PathElement::new(QName::unprefixed("gone"), 1));
        index.retain(node, path.clone());
        assert_eq!(index.lookup(node), Some(path));
        index.release(node);
        assert_eq!(index.lookup(node), None);
    }
}
