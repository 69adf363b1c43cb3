//! Node/Property façades returned by the Item Manager (spec §4.3): thin,
//! cached wrappers around an `ItemState` that present the public shape a
//! session hands to callers, distinct from the mutable transient state
//! itself.

use crate::{
    id::{ItemId, NodeId, PropertyId},
    names::QName,
    path::Path,
    state::ItemState,
    value::{PropertyType, Value},
};

/// What kind of node this façade represents, beyond the generic case
/// (spec §4.3 supplement: `nt:version`/`nt:versionHistory` specialize the
/// façade with extra accessors rather than requiring callers to fish
/// version metadata out of plain properties).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Regular,
    Version { containing_history: NodeId },
    VersionHistory { versionable: NodeId },
}

/// A read-only view of a node at the time it was fetched from the Item
/// Manager. Cheap to clone; re-fetch through the manager to see later
/// changes.
#[derive(Debug, Clone)]
pub struct NodeFacade {
    id: NodeId,
    path: Path,
    primary_type: QName,
    mixin_types: Vec<QName>,
    kind: NodeKind,
}

impl NodeFacade {
    #[must_use]
    pub fn from_state(path: Path, state: &ItemState) -> Option<Self> {
        let ItemId::Node(id) = *state.id() else { return None };
        let node = state.as_node()?;
        let kind = classify(&node.primary_type, &node.additional_parents);
        Some(Self {
            id,
            path,
            primary_type: node.primary_type.clone(),
            mixin_types: node.mixin_types.clone(),
            kind,
        })
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn primary_type(&self) -> &QName {
        &self.primary_type
    }

    #[must_use]
    pub fn mixin_types(&self) -> &[QName] {
        &self.mixin_types
    }

    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn is_node_type(&self, name: &QName) -> bool {
        &self.primary_type == name || self.mixin_types.contains(name)
    }

    /// Present only when `kind` is [`NodeKind::Version`].
    #[must_use]
    pub fn containing_history(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Version { containing_history } => Some(containing_history),
            _ => None,
        }
    }

    /// Present only when `kind` is [`NodeKind::VersionHistory`].
    #[must_use]
    pub fn versionable_node(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::VersionHistory { versionable } => Some(versionable),
            _ => None,
        }
    }
}

fn classify(primary_type: &QName, additional_parents: &[NodeId]) -> NodeKind {
    if primary_type.namespace_uri() != crate::names::NT_NAMESPACE_URI {
        return NodeKind::Regular;
    }
    match primary_type.local_name() {
        "version" => additional_parents
            .first()
            .map_or(NodeKind::Regular, |history| NodeKind::Version { containing_history: *history }),
        "versionHistory" => additional_parents
            .first()
            .map_or(NodeKind::Regular, |versionable| NodeKind::VersionHistory { versionable: *versionable }),
        _ => NodeKind::Regular,
    }
}

/// A read-only view of a property at the time it was fetched.
#[derive(Debug, Clone)]
pub struct PropertyFacade {
    id: PropertyId,
    property_type: PropertyType,
    multi_valued: bool,
    values: Vec<Value>,
}

impl PropertyFacade {
    #[must_use]
    pub fn from_state(state: &ItemState) -> Option<Self> {
        let ItemId::Property(id) = state.id().clone() else { return None };
        let prop = state.as_property()?;
        Some(Self {
            id,
            property_type: prop.property_type,
            multi_valued: prop.multi_valued,
            values: prop.values.clone(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &PropertyId {
        &self.id
    }

    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        self.property_type
    }

    #[must_use]
    pub const fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.values.first()
    }
}
