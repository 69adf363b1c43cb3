//! Typed operations and the change log constructed by a save traversal
//! (spec §4.1).

use crate::{
    id::{ItemId, NodeId, PropertyId},
    names::QName,
    path::Path,
    value::Value,
};

/// A single mutation to submit to the Repository Service.
#[derive(Debug, Clone)]
pub enum Operation {
    AddNode {
        parent: NodeId,
        name: QName,
        primary_type: QName,
        new_id: NodeId,
    },
    AddProperty {
        parent: NodeId,
        name: QName,
        value: Vec<Value>,
    },
    SetProperty {
        id: PropertyId,
        value: Vec<Value>,
    },
    SetMixin {
        node: NodeId,
        mixins: Vec<QName>,
    },
    Remove {
        id: ItemId,
    },
    Move {
        source: Path,
        destination: Path,
    },
    ReorderNodes {
        parent: NodeId,
        ordering: Vec<NodeId>,
    },
    Clone {
        source_workspace: String,
        source: Path,
        destination: Path,
    },
    Copy {
        source: Path,
        destination: Path,
    },
    Checkin {
        node: NodeId,
    },
    Checkout {
        node: NodeId,
    },
    Restore {
        node: NodeId,
        version_label: String,
    },
    Merge {
        node: NodeId,
        source_workspace: String,
    },
    Lock {
        node: NodeId,
        is_deep: bool,
        is_session_scoped: bool,
    },
    Unlock {
        node: NodeId,
    },
    Update {
        node: NodeId,
        source_workspace: String,
    },
}

/// An ordered batch of [`Operation`]s rooted at the nearest common ancestor
/// of all changed states (spec §4.1: "the log's *target* id is the nearest
/// common ancestor of all changed states").
#[derive(Debug, Clone)]
pub struct ChangeLog {
    target: NodeId,
    operations: Vec<Operation>,
}

impl ChangeLog {
    #[must_use]
    pub const fn new(target: NodeId) -> Self {
        Self {
            target,
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }
}
