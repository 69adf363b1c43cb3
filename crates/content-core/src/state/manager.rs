//! `ItemStateManager`: the session-local transient overlay (spec §4.1).

use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::{
    id::{ItemId, NodeId, PropertyId},
    state::{ChangeLog, Event, ItemState, Operation, Status},
    Error, Result,
};

/// Collaborator that turns a [`ChangeLog`] into a committed change against
/// the backing store. Implemented by `workspace::WorkspaceCoordinator`; kept
/// as a trait here so the state layer does not depend on the workspace
/// module (dependency-inversion, matching the teacher's repository-trait
/// pattern in `domain/repository.rs`).
pub trait ChangeLogSubmitter {
    /// Submit `log` for execution. On `Ok`, every operation in the log was
    /// applied; on `Err`, none were (spec §4.1: "abort-as-a-whole").
    fn submit(&self, log: &ChangeLog) -> Result<()>;
}

/// Collaborator that validates a state against its effective node type
/// before it is allowed into a `ChangeLog` (spec §4.4 validation rules).
/// Implemented by `nodetype::registry::NodeTypeRegistry`.
pub trait StateValidator {
    fn validate(&self, state: &ItemState) -> Result<()>;
}

/// A validator that accepts everything; useful for tests and for
/// configurations that have not registered any node types yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveValidator;

impl StateValidator for PermissiveValidator {
    fn validate(&self, _state: &ItemState) -> Result<()> {
        Ok(())
    }
}

/// Owns the transient states for one session (spec §3 Ownership: "The
/// Session exclusively owns its transient states").
#[derive(Debug, Default)]
pub struct ItemStateManager {
    states: DashMap<ItemId, ItemState>,
}

impl ItemStateManager {
    #[must_use]
    pub fn new() -> Self {
        Self { states: DashMap::new() }
    }

    /// Side-effect-free existence check.
    #[must_use]
    pub fn has_item_state(&self, id: &ItemId) -> bool {
        self.states.contains_key(id)
    }

    /// Fetch a state by id. Returns `Error::ItemNotFound` if absent.
    pub fn get_item_state(&self, id: &ItemId) -> Result<ItemState> {
        self.states
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    /// Allocate a new transient state. Fails with `Error::ItemExists` if a
    /// transient state for this id already exists.
    pub fn create_transient(&self, state: ItemState) -> Result<()> {
        let id = state.id().clone();
        if self.states.contains_key(&id) {
            return Err(Error::ItemExists(id.to_string()));
        }
        self.states.insert(id, state);
        Ok(())
    }

    /// Replace an existing transient state (used by mutation operations that
    /// drive the status automaton, e.g. `setProperty`).
    pub fn replace(&self, state: ItemState) {
        self.states.insert(state.id().clone(), state);
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.states.iter().any(|e| e.value().status().is_transient())
    }

    /// Depth-first collection of every transient descendant of `root`,
    /// root included, by walking `parent_id` links recorded on each state.
    fn collect_subtree(&self, root: NodeId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let node_item = ItemId::Node(node);
            if self.states.contains_key(&node_item) {
                out.push(node_item.clone());
            }
            // properties and child nodes recorded on the node state
            if let Some(entry) = self.states.get(&node_item) {
                if let Some(node_state) = entry.value().as_node() {
                    for name in &node_state.property_names {
                        let pid = ItemId::Property(PropertyId::new(node, name.clone()));
                        if self.states.contains_key(&pid) {
                            out.push(pid);
                        }
                    }
                    for child in &node_state.child_entries {
                        stack.push(child.child_id);
                    }
                }
            }
        }
        out
    }

    /// Save traversal (spec §4.1 "Algorithm — save traversal"):
    /// depth-first collect, validate, build a `ChangeLog`, submit, then
    /// promote statuses only on success.
    #[instrument(skip(self, submitter, validator))]
    pub fn save(
        &self,
        root: NodeId,
        submitter: &dyn ChangeLogSubmitter,
        validator: &dyn StateValidator,
    ) -> Result<()> {
        let subtree = self.collect_subtree(root);
        let mut changed: Vec<ItemId> = Vec::new();
        for id in &subtree {
            if let Some(entry) = self.states.get(id) {
                if entry.value().status().is_transient() {
                    changed.push(id.clone());
                }
            }
        }
        if changed.is_empty() {
            return Ok(());
        }

        for id in &changed {
            let state = self.get_item_state(id)?;
            validator.validate(&state)?;
        }

        let mut log = ChangeLog::new(root);
        for id in &changed {
            let state = self.get_item_state(id)?;
            self.push_operation_for(&mut log, &state);
        }

        submitter.submit(&log).map_err(|e| {
            debug!(error = %e, "save batch rejected, transient states left untouched");
            e
        })?;

        for id in &changed {
            if let Some(mut entry) = self.states.get_mut(id) {
                let event = match entry.value().status() {
                    Status::New | Status::ExistingModified | Status::ExistingRemoved => Event::Save,
                    _ => continue,
                };
                entry.value_mut().transition(event)?;
            }
        }
        // Removed states are no longer reachable: drop them from the arena.
        for id in &changed {
            if let Some(entry) = self.states.get(id) {
                if entry.value().status() == Status::Removed {
                    drop(entry);
                    self.states.remove(id);
                }
            }
        }
        Ok(())
    }

    /// Discard transient changes in the sub-tree rooted at `root` (spec
    /// §4.1 `undo`).
    pub fn undo(&self, root: NodeId) -> Result<()> {
        let subtree = self.collect_subtree(root);
        for id in &subtree {
            if let Some(mut entry) = self.states.get_mut(id) {
                apply_undo(entry.value_mut());
            }
        }
        for id in &subtree {
            if let Some(entry) = self.states.get(id) {
                if entry.value().status() == Status::Removed {
                    drop(entry);
                    self.states.remove(id);
                }
            }
        }
        Ok(())
    }

    /// Look up the name under which `node` is referenced from `parent`'s
    /// ordered child-entry list, falling back to the primary type name if
    /// the parent's entry is not (yet) recorded transiently.
    fn name_under_parent(&self, parent: NodeId, node: NodeId, fallback: &crate::names::QName) -> crate::names::QName {
        self.states
            .get(&ItemId::Node(parent))
            .and_then(|entry| {
                entry
                    .value()
                    .as_node()
                    .and_then(|n| n.child_entries.iter().find(|e| e.child_id == node).map(|e| e.name.clone()))
            })
            .unwrap_or_else(|| fallback.clone())
    }

    fn push_operation_for(&self, log: &mut ChangeLog, state: &ItemState) {
        match state.id() {
            ItemId::Node(node_id) => {
                if let Some(node) = state.as_node() {
                    match state.status() {
                        Status::New => {
                            if let Some(parent) = state.parent_id() {
                                let name = self.name_under_parent(parent, *node_id, &node.primary_type);
                                log.push(Operation::AddNode {
                                    parent,
                                    name,
                                    primary_type: node.primary_type.clone(),
                                    new_id: *node_id,
                                });
                            }
                        }
                        Status::ExistingModified => {
                            log.push(Operation::SetMixin {
                                node: *node_id,
                                mixins: node.mixin_types.clone(),
                            });
                        }
                        Status::ExistingRemoved => {
                            log.push(Operation::Remove { id: state.id().clone() });
                        }
                        _ => {}
                    }
                }
            }
            ItemId::Property(prop_id) => {
                if let Some(prop) = state.as_property() {
                    match state.status() {
                        Status::New => log.push(Operation::AddProperty {
                            parent: prop_id.parent(),
                            name: prop_id.name().clone(),
                            value: prop.values.clone(),
                        }),
                        Status::ExistingModified => log.push(Operation::SetProperty {
                            id: prop_id.clone(),
                            value: prop.values.clone(),
                        }),
                        Status::ExistingRemoved => {
                            log.push(Operation::Remove { id: state.id().clone() });
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// `refresh(keepChanges)`: `refresh(false)` discards all pending changes
    /// (equivalent to `undo` from root); `refresh(true)` preserves
    /// `New`/`ExistingModified` states and only pulls fresh data into
    /// unmodified descendants.
    pub fn refresh(&self, root: NodeId, keep_changes: bool) -> Result<()> {
        if !keep_changes {
            return self.undo(root);
        }
        let subtree = self.collect_subtree(root);
        for id in &subtree {
            if let Some(entry) = self.states.get(id) {
                let status = entry.value().status();
                if status == Status::Existing {
                    if let Some(overlayed) = entry.value().overlayed() {
                        let refreshed = overlayed.clone();
                        drop(entry);
                        self.states.insert(id.clone(), refreshed);
                    }
                }
            }
        }
        Ok(())
    }
}

fn apply_undo(state: &mut ItemState) {
    let next = match state.status() {
        Status::New => Status::Removed,
        Status::ExistingModified | Status::ExistingRemoved => Status::Existing,
        other => other,
    };
    state.set_status(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{names::QName, state::NodeState, value::{PropertyType, Value}, state::PropertyState};

    struct AcceptingSubmitter;
    impl ChangeLogSubmitter for AcceptingSubmitter {
        fn submit(&self, _log: &ChangeLog) -> Result<()> {
            Ok(())
        }
    }

    struct FailingSubmitter;
    impl ChangeLogSubmitter for FailingSubmitter {
        fn submit(&self, _log: &ChangeLog) -> Result<()> {
            Err(Error::RepositoryError("backing store unavailable".into()))
        }
    }

    #[test]
    fn save_promotes_new_node_to_existing() {
        let mgr = ItemStateManager::new();
        let root = NodeId::root();
        let child = NodeId::new();
        let mut root_state = ItemState::new_node(root, None, Status::Existing, NodeState::new(QName::unprefixed("nt:base")));
        root_state
            .as_node_mut()
            .expect("node")
            .child_entries
            .push(crate::state::ChildNodeEntry {
                name: QName::unprefixed("a"),
                index: 1,
                child_id: child,
            });
        mgr.create_transient(root_state).expect("create");
        mgr.create_transient(ItemState::new_node(
            child,
            Some(root),
            Status::New,
            NodeState::new(QName::unprefixed("nt:base")),
        ))
        .expect("create");

        mgr.save(root, &AcceptingSubmitter, &PermissiveValidator)
            .expect("save succeeds");

        let state = mgr.get_item_state(&ItemId::Node(child)).expect("still present");
        assert_eq!(state.status(), Status::Existing);
        assert!(!mgr.has_pending_changes());
    }

    #[test]
    fn save_failure_leaves_transient_state_untouched() {
        let mgr = ItemStateManager::new();
        let root = NodeId::root();
        let mut prop = PropertyState::new(PropertyType::Long, false);
        prop.values.push(Value::from(42_i64));
        let pid = PropertyId::new(root, QName::unprefixed("p"));
        let mut root_state = ItemState::new_node(root, None, Status::Existing, NodeState::new(QName::unprefixed("nt:base")));
        root_state.as_node_mut().expect("node").property_names.push(QName::unprefixed("p"));
        mgr.create_transient(root_state).expect("create");
        mgr.create_transient(ItemState::new_property(pid.clone(), Status::New, prop))
            .expect("create");

        let result = mgr.save(root, &FailingSubmitter, &PermissiveValidator);
        assert!(result.is_err());
        let state = mgr.get_item_state(&ItemId::Property(pid)).expect("untouched");
        assert_eq!(state.status(), Status::New);
        assert!(mgr.has_pending_changes());
    }

    #[test]
    fn undo_removes_new_state_and_reverts_modified() {
        let mgr = ItemStateManager::new();
        let root = NodeId::root();
        mgr.create_transient(ItemState::new_node(
            root,
            None,
            Status::ExistingModified,
            NodeState::new(QName::unprefixed("nt:base")),
        ))
        .expect("create");

        mgr.undo(root).expect("undo");
        let state = mgr.get_item_state(&ItemId::Node(root)).expect("present");
        assert_eq!(state.status(), Status::Existing);
        assert!(!mgr.has_pending_changes());
    }
}
