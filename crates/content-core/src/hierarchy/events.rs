//! Invalidation events the Caching Hierarchy Manager reacts to (spec §4.2).

use crate::{id::NodeId, path::Path};

/// A structural or content change that may invalidate cached path/id
/// lookups. Emitted by `ItemStateManager`/`WorkspaceCoordinator` and
/// consumed by [`super::cache::HierarchyCache::apply`].
#[derive(Debug, Clone)]
pub enum InvalidationEvent {
    /// A node was added under `parent` at `path`.
    NodeAdded { parent: NodeId, path: Path, node: NodeId },
    /// A node (and everything beneath it) was removed.
    NodeRemoved { node: NodeId, path: Path },
    /// A parent's children were reordered or renamed as a batch (e.g. a
    /// move): every cached path under `parent` must be treated as stale.
    NodesReplaced { parent: NodeId },
    /// A transient state began shadowing its persistent counterpart.
    StateModified { node: NodeId },
    /// A persistent state was destroyed by another session and this
    /// session's cached mirror must be dropped.
    StateDestroyed { node: NodeId },
    /// A transient state was discarded (`undo`/`refresh(false)`).
    StateDiscarded { node: NodeId },
    /// A transient state began overlaying a persistent one.
    StateOverlaid { node: NodeId },
    /// A transient state's overlay was removed (promoted on save, or the
    /// overlay became stale).
    StateUncovered { node: NodeId },
}

impl InvalidationEvent {
    /// The node whose cached entries must be dropped or revalidated.
    #[must_use]
    pub const fn subject(&self) -> NodeId {
        match self {
            Self::NodeAdded { node, .. } | Self::NodeRemoved { node, .. } => *node,
            Self::NodesReplaced { parent } => *parent,
            Self::StateModified { node }
            | Self::StateDestroyed { node }
            | Self::StateDiscarded { node }
            | Self::StateOverlaid { node }
            | Self::StateUncovered { node } => *node,
        }
    }

    /// Whether the whole subtree rooted at `subject` must be invalidated,
    /// as opposed to just the one entry.
    #[must_use]
    pub const fn invalidates_subtree(&self) -> bool {
        matches!(self, Self::NodeRemoved { .. } | Self::NodesReplaced { .. } | Self::StateDestroyed { .. })
    }
}
