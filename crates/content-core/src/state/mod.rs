//! The item state layer: the transient overlay over workspace-backed
//! persistent states (spec §4.1).
//!
//! Design Notes §9 replaces listener-chains-on-states with a tagged sum
//! type plus an arena: `ItemState` is `{Node(NodeState), Property(PropertyState)}`,
//! states live in an arena indexed by id, and the "overlayed" relationship
//! is an explicit pointer rather than an implicit parent-class field.

pub mod changelog;
pub mod manager;
pub mod status;

use std::sync::Arc;

use crate::{
    id::{ItemId, NodeId, PropertyId},
    names::QName,
    value::{PropertyType, Value},
};

pub use changelog::{ChangeLog, Operation};
pub use manager::ItemStateManager;
pub use status::{Event, Status};

/// One child-node entry in a node's ordered list of children (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNodeEntry {
    pub name: QName,
    pub index: u32,
    pub child_id: NodeId,
}

/// Node-specific attributes of an [`ItemState`].
#[derive(Debug, Clone)]
pub struct NodeState {
    pub primary_type: QName,
    pub mixin_types: Vec<QName>,
    pub definition_id: Option<String>,
    pub child_entries: Vec<ChildNodeEntry>,
    pub property_names: Vec<QName>,
    /// Additional parent ids for shareable/linked nodes (spec §3).
    pub additional_parents: Vec<NodeId>,
}

impl NodeState {
    #[must_use]
    pub fn new(primary_type: QName) -> Self {
        Self {
            primary_type,
            mixin_types: Vec::new(),
            definition_id: None,
            child_entries: Vec::new(),
            property_names: Vec::new(),
            additional_parents: Vec::new(),
        }
    }

    /// All type names contributing to this node's effective type: primary
    /// plus mixins, in that order.
    #[must_use]
    pub fn all_type_names(&self) -> Vec<QName> {
        let mut names = vec![self.primary_type.clone()];
        names.extend(self.mixin_types.iter().cloned());
        names
    }

    /// Whether a property with `name` would collide with a child node name
    /// under this node (spec §3 invariant).
    #[must_use]
    pub fn has_name_collision(&self, name: &QName) -> bool {
        self.property_names.contains(name)
            && self.child_entries.iter().any(|e| &e.name == name)
    }
}

/// Property-specific attributes of an [`ItemState`].
#[derive(Debug, Clone)]
pub struct PropertyState {
    pub property_type: PropertyType,
    pub multi_valued: bool,
    pub values: Vec<Value>,
    pub definition_id: Option<String>,
}

impl PropertyState {
    #[must_use]
    pub const fn new(property_type: PropertyType, multi_valued: bool) -> Self {
        Self {
            property_type,
            multi_valued,
            values: Vec::new(),
            definition_id: None,
        }
    }
}

/// The type-specific payload of an [`ItemState`].
#[derive(Debug, Clone)]
pub enum Payload {
    Node(NodeState),
    Property(PropertyState),
}

/// A tagged item state record: the common attributes of spec §3 plus a
/// node- or property-specific payload.
#[derive(Debug, Clone)]
pub struct ItemState {
    id: ItemId,
    parent_id: Option<NodeId>,
    status: Status,
    /// The persistent snapshot this transient state shadows, if any
    /// (copy-on-write: absent for brand-new `New` states).
    overlayed: Option<Arc<ItemState>>,
    payload: Payload,
}

impl ItemState {
    #[must_use]
    pub fn new_node(
        id: NodeId,
        parent_id: Option<NodeId>,
        status: Status,
        node: NodeState,
    ) -> Self {
        Self {
            id: ItemId::Node(id),
            parent_id,
            status,
            overlayed: None,
            payload: Payload::Node(node),
        }
    }

    #[must_use]
    pub fn new_property(
        id: PropertyId,
        status: Status,
        property: PropertyState,
    ) -> Self {
        let parent_id = Some(id.parent());
        Self {
            id: ItemId::Property(id),
            parent_id,
            status,
            overlayed: None,
            payload: Payload::Property(property),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &ItemId {
        &self.id
    }

    #[must_use]
    pub const fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    #[must_use]
    pub fn overlayed(&self) -> Option<&ItemState> {
        self.overlayed.as_deref()
    }

    /// Wrap `self` as a copy-on-write shadow over `persistent`.
    #[must_use]
    pub fn overlaying(mut self, persistent: Arc<ItemState>) -> Self {
        self.overlayed = Some(persistent);
        self
    }

    #[must_use]
    pub const fn is_node(&self) -> bool {
        matches!(self.payload, Payload::Node(_))
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&NodeState> {
        match &self.payload {
            Payload::Node(n) => Some(n),
            Payload::Property(_) => None,
        }
    }

    #[must_use]
    pub fn as_node_mut(&mut self) -> Option<&mut NodeState> {
        match &mut self.payload {
            Payload::Node(n) => Some(n),
            Payload::Property(_) => None,
        }
    }

    #[must_use]
    pub fn as_property(&self) -> Option<&PropertyState> {
        match &self.payload {
            Payload::Property(p) => Some(p),
            Payload::Node(_) => None,
        }
    }

    #[must_use]
    pub fn as_property_mut(&mut self) -> Option<&mut PropertyState> {
        match &mut self.payload {
            Payload::Property(p) => Some(p),
            Payload::Node(_) => None,
        }
    }

    /// Transition the status via the automaton, mutating in place.
    pub fn transition(&mut self, event: Event) -> crate::Result<()> {
        self.status = self.status.apply(event)?;
        Ok(())
    }
}
