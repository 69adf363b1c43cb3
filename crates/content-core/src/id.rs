//! Opaque item identity: node ids (UUIDs) and property ids
//! (`parentNodeId` + `QName`).

use std::fmt;

use uuid::Uuid;

use crate::names::QName;

/// Identifies a node by an immutable, process-wide-unique UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Uuid);

impl NodeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn root() -> Self {
        Self(Uuid::nil())
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.0.is_nil()
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a property by the node it lives under plus its name. Property
/// ids have no independent UUID: they are derived, not allocated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyId {
    parent: NodeId,
    name: QName,
}

impl PropertyId {
    #[must_use]
    pub const fn new(parent: NodeId, name: QName) -> Self {
        Self { parent, name }
    }

    #[must_use]
    pub const fn parent(&self) -> NodeId {
        self.parent
    }

    #[must_use]
    pub const fn name(&self) -> &QName {
        &self.name
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/@{}", self.parent, self.name)
    }
}

/// Identifies either kind of item. Most of the engine's maps are keyed on
/// this rather than on `NodeId`/`PropertyId` directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemId {
    Node(NodeId),
    Property(PropertyId),
}

impl ItemId {
    #[must_use]
    pub const fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    #[must_use]
    pub const fn is_property(&self) -> bool {
        matches!(self, Self::Property(_))
    }

    /// The node this item belongs to: itself if a node, its parent if a
    /// property.
    #[must_use]
    pub const fn owning_node(&self) -> NodeId {
        match self {
            Self::Node(id) => *id,
            Self::Property(id) => id.parent,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::Property(id) => write!(f, "{id}"),
        }
    }
}

impl From<NodeId> for ItemId {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<PropertyId> for ItemId {
    fn from(id: PropertyId) -> Self {
        Self::Property(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_distinct() {
        assert_ne!(NodeId::new(), NodeId::new());
    }

    #[test]
    fn root_is_recognizable() {
        assert!(NodeId::root().is_root());
        assert!(!NodeId::new().is_root());
    }

    #[test]
    fn property_id_owning_node_is_parent() {
        let parent = NodeId::new();
        let pid = PropertyId::new(parent, QName::unprefixed("p"));
        let item: ItemId = pid.into();
        assert_eq!(item.owning_node(), parent);
    }
}
