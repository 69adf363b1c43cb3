//! `Session` (spec §2): a client's authenticated, short-lived view of one
//! workspace. Binds a `WorkspaceCoordinator`, a session-local namespace
//! remapping, the Item State Layer's transient overlay, the node-type
//! registry as validator, and the lock manager reached through the
//! coordinator, into the single object application code talks to.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::RwLock;
use tracing::instrument;

use crate::{
    id::{ItemId, NodeId, PropertyId},
    itemmgr::{AccessManager, Item, ItemManager},
    names::NamespaceResolver,
    nodetype::NodeTypeRegistry,
    path::Path,
    state::{ChildNodeEntry, Event, ItemState, ItemStateManager, NodeState, PropertyState, Status},
    value::{PropertyType, Value},
    workspace::{
        service::{ItemInfo, LockInfo, RepositoryService},
        CacheBehaviour, VersionManager, WorkspaceCoordinator,
    },
    Error, Result,
};

pub use crate::itemmgr::{NodeFacade, PropertyFacade};

/// One authenticated session onto a workspace (spec §2). Not `Clone`: a
/// session owns its transient overlay exclusively, matching spec §3
/// Ownership ("the Session exclusively owns its transient states").
pub struct Session<S: RepositoryService + 'static> {
    coordinator: Arc<WorkspaceCoordinator<S>>,
    namespaces: RwLock<NamespaceResolver>,
    states: Arc<ItemStateManager>,
    node_types: Arc<NodeTypeRegistry>,
    items: ItemManager,
    closed: AtomicBool,
}

impl<S: RepositoryService + 'static> Session<S> {
    /// `Repository.login(workspaceName)` (spec §6): open a session, start
    /// the coordinator (and, if configured, its poll worker), and seed a
    /// namespace resolver with the built-in prefixes.
    #[instrument(skip(service, node_types, version_manager, access))]
    #[allow(clippy::too_many_arguments)]
    pub async fn login(
        service: Arc<S>,
        workspace_name: &str,
        cache_behaviour: CacheBehaviour,
        poll_timeout_ms: u64,
        node_types: Arc<NodeTypeRegistry>,
        version_manager: Arc<dyn VersionManager>,
        access: Arc<dyn AccessManager>,
        hierarchy_cache_capacity: usize,
    ) -> Result<Self> {
        let info = service.login(workspace_name).await?;
        let coordinator = Arc::new(
            WorkspaceCoordinator::new(
                service,
                info,
                cache_behaviour,
                poll_timeout_ms,
                version_manager,
                hierarchy_cache_capacity,
            )
            .await?,
        );
        let states = Arc::new(ItemStateManager::new());
        let hierarchy: Arc<dyn crate::hierarchy::HierarchyManager> = coordinator.clone();
        let items = ItemManager::new(states.clone(), hierarchy, access);
        Ok(Self {
            coordinator,
            namespaces: RwLock::new(NamespaceResolver::with_builtins()),
            states,
            node_types,
            items,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::InvalidItemState("session is closed".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    /// `Session.logout()` (spec §6): idempotent. Stops the coordinator's
    /// poll worker; the transient overlay is simply dropped with `self`.
    pub fn logout(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        self.coordinator.stop_polling();
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId::root()
    }

    #[must_use]
    pub fn node_type_registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.node_types
    }

    #[must_use]
    pub fn item_manager(&self) -> &ItemManager {
        &self.items
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<WorkspaceCoordinator<S>> {
        &self.coordinator
    }

    /// Parse JCR text form into a [`Path`] using this session's (local)
    /// namespace remapping.
    pub fn resolve_path(&self, text: &str) -> Result<Path> {
        Path::parse(text, &self.namespaces.read())
    }

    /// Load the persistent snapshot of `id` into the transient overlay as
    /// an `Existing` state, if it is not already present there (spec §4.1:
    /// the overlay shadows persistent state lazily, on first touch).
    fn ensure_loaded(&self, id: &ItemId) -> Result<()> {
        if self.states.has_item_state(id) {
            return Ok(());
        }
        let state = match self.coordinator.item_info(id)? {
            ItemInfo::Node(info) => {
                let mut node = NodeState::new(info.primary_type);
                node.mixin_types = info.mixin_types;
                node.property_names = info.property_names;
                node.child_entries = info
                    .child_entries
                    .into_iter()
                    .map(|c| ChildNodeEntry { name: c.name, index: c.index, child_id: c.id })
                    .collect();
                ItemState::new_node(info.id, info.parent_id, Status::Existing, node)
            }
            ItemInfo::Property { id: pid, values } => {
                let property_type = values.first().map_or(PropertyType::Undefined, Value::property_type);
                let multi_valued = values.len() > 1;
                let mut prop = PropertyState::new(property_type, multi_valued);
                prop.values = values;
                ItemState::new_property(pid, Status::Existing, prop)
            }
        };
        match self.states.create_transient(state) {
            Ok(()) | Err(Error::ItemExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub fn get_node_by_id(&self, id: NodeId) -> Result<NodeFacade> {
        self.ensure_open()?;
        self.ensure_loaded(&ItemId::Node(id))?;
        match self.items.get_item(&ItemId::Node(id))? {
            Item::Node(facade) => Ok(facade),
            Item::Property(_) => Err(Error::ItemNotFound(id.to_string())),
        }
    }

    /// `Session.getNode(path)` (spec §6): resolves `path` through the
    /// hierarchy manager, then fetches the façade.
    pub fn get_node(&self, path: &str) -> Result<NodeFacade> {
        self.ensure_open()?;
        let parsed = self.resolve_path(path)?;
        let id = self.coordinator.resolve_path(&parsed)?;
        self.get_node_by_id(id)
    }

    #[must_use]
    pub fn node_exists(&self, path: &str) -> bool {
        self.get_node(path).is_ok()
    }

    pub fn get_property(&self, node: NodeId, name: &str) -> Result<PropertyFacade> {
        self.ensure_open()?;
        let name_q = self.namespaces.read().parse(name)?;
        let id = ItemId::Property(PropertyId::new(node, name_q));
        self.ensure_loaded(&id)?;
        match self.items.get_item(&id)? {
            Item::Property(facade) => Ok(facade),
            Item::Node(_) => Err(Error::ItemNotFound(id.to_string())),
        }
    }

    pub fn children(&self, parent: NodeId) -> Result<Vec<NodeFacade>> {
        self.ensure_open()?;
        self.ensure_loaded(&ItemId::Node(parent))?;
        let entries = self
            .states
            .get_item_state(&ItemId::Node(parent))?
            .as_node()
            .map(|n| n.child_entries.clone())
            .unwrap_or_default();
        for entry in &entries {
            self.ensure_loaded(&ItemId::Node(entry.child_id))?;
        }
        self.items.get_child_nodes(parent)
    }

    pub fn properties(&self, parent: NodeId) -> Result<Vec<PropertyFacade>> {
        self.ensure_open()?;
        self.ensure_loaded(&ItemId::Node(parent))?;
        let names = self
            .states
            .get_item_state(&ItemId::Node(parent))?
            .as_node()
            .map(|n| n.property_names.clone())
            .unwrap_or_default();
        for name in &names {
            self.ensure_loaded(&ItemId::Property(PropertyId::new(parent, name.clone())))?;
        }
        self.items.get_child_properties(parent)
    }

    /// `Node.addNode(name, primaryType)` (spec §6): allocates a new id,
    /// appends a child entry to the parent's transient state (promoting it
    /// to `ExistingModified` if it was `Existing`), and creates a fresh
    /// `New` transient state for the child.
    #[instrument(skip(self))]
    pub fn add_node(&self, parent: NodeId, name: &str, primary_type: &str) -> Result<NodeId> {
        self.ensure_open()?;
        self.coordinator.check_lock(parent)?;
        self.ensure_loaded(&ItemId::Node(parent))?;

        let name_q = self.namespaces.read().parse(name)?;
        let type_q = self.namespaces.read().parse(primary_type)?;
        let new_id = NodeId::new();

        let mut parent_state = self.states.get_item_state(&ItemId::Node(parent))?;
        let index = parent_state
            .as_node()
            .map(|n| n.child_entries.iter().filter(|e| e.name == name_q).count() as u32 + 1)
            .unwrap_or(1);
        {
            let node = parent_state.as_node_mut().ok_or_else(|| Error::ItemNotFound(parent.to_string()))?;
            node.child_entries.push(ChildNodeEntry { name: name_q, index, child_id: new_id });
        }
        if parent_state.status() == Status::Existing {
            parent_state.transition(Event::MutateInSession)?;
        }
        self.states.replace(parent_state);

        self.states
            .create_transient(ItemState::new_node(new_id, Some(parent), Status::New, NodeState::new(type_q)))?;
        self.items.invalidate(&ItemId::Node(parent));
        self.items.notify_created(&ItemId::Node(new_id));
        Ok(new_id)
    }

    /// `Node.setProperty(name, values)` (spec §6): creates the property's
    /// transient state if absent, else mutates it in place.
    #[instrument(skip(self, values))]
    pub fn set_property(&self, node: NodeId, name: &str, values: Vec<Value>) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.check_lock(node)?;
        self.ensure_loaded(&ItemId::Node(node))?;

        let name_q = self.namespaces.read().parse(name)?;
        let property_type = values.first().map_or(PropertyType::Undefined, Value::property_type);
        let multi_valued = values.len() > 1;
        let pid = PropertyId::new(node, name_q.clone());
        let prop_item = ItemId::Property(pid.clone());

        let is_new = self.states.get_item_state(&prop_item).is_err();
        let prop_state = match self.states.get_item_state(&prop_item) {
            Ok(mut state) => {
                if let Some(prop) = state.as_property_mut() {
                    prop.values = values;
                    prop.property_type = property_type;
                }
                if state.status() == Status::Existing {
                    state.transition(Event::MutateInSession)?;
                }
                state
            }
            Err(_) => {
                let mut prop = PropertyState::new(property_type, multi_valued);
                prop.values = values;
                ItemState::new_property(pid, Status::New, prop)
            }
        };
        self.states.replace(prop_state);

        let mut node_state = self.states.get_item_state(&ItemId::Node(node))?;
        let already_listed = node_state.as_node().is_some_and(|n| n.property_names.contains(&name_q));
        if !already_listed {
            if let Some(n) = node_state.as_node_mut() {
                n.property_names.push(name_q);
            }
            if node_state.status() == Status::Existing {
                node_state.transition(Event::MutateInSession)?;
            }
            self.states.replace(node_state);
        }
        if is_new {
            self.items.notify_created(&prop_item);
        } else {
            self.items.invalidate(&prop_item);
        }
        self.items.invalidate(&ItemId::Node(node));
        Ok(())
    }

    /// `Node.remove()` (spec §6). A node that was only ever `New` in this
    /// session is removed outright (`Event::RemoveTransient`); an `Existing`
    /// or `ExistingModified` node is marked `ExistingRemoved` and only
    /// dropped from the workspace on `save`.
    #[instrument(skip(self))]
    pub fn remove_node(&self, node: NodeId) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.check_lock(node)?;
        self.ensure_loaded(&ItemId::Node(node))?;
        let mut state = self.states.get_item_state(&ItemId::Node(node))?;
        let event = if state.status() == Status::New { Event::RemoveTransient } else { Event::RemoveInSession };
        if event == Event::RemoveInSession {
            if let Ok(path) = self.coordinator.resolve_id(node) {
                self.coordinator.retain_zombie(node, path);
            }
        }
        state.transition(event)?;
        self.states.replace(state);
        self.items.notify_removed(&ItemId::Node(node));
        Ok(())
    }

    /// `getPath(node)` that also answers for a node this session has
    /// transiently removed but not yet saved (spec §4.2 "include-removed").
    pub fn get_path_including_removed(&self, node: NodeId) -> Result<Path> {
        self.ensure_open()?;
        self.coordinator.resolve_id_including_removed(node)
    }

    pub fn remove_property(&self, node: NodeId, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.check_lock(node)?;
        let name_q = self.namespaces.read().parse(name)?;
        let id = ItemId::Property(PropertyId::new(node, name_q));
        self.ensure_loaded(&id)?;
        let mut state = self.states.get_item_state(&id)?;
        let event = if state.status() == Status::New { Event::RemoveTransient } else { Event::RemoveInSession };
        state.transition(event)?;
        self.states.replace(state);
        self.items.notify_removed(&id);
        Ok(())
    }

    /// `Item.save()` scoped at `root` (spec §4.1 save traversal).
    pub fn save_subtree(&self, root: NodeId) -> Result<()> {
        self.ensure_open()?;
        self.states.save(root, self.coordinator.as_ref(), self.node_types.as_ref())?;
        self.coordinator.clear_zombies();
        Ok(())
    }

    /// `Session.save()` (spec §6): saves the whole session, i.e. the
    /// subtree rooted at the workspace root.
    pub fn save(&self) -> Result<()> {
        self.save_subtree(NodeId::root())
    }

    pub fn refresh(&self, keep_changes: bool) -> Result<()> {
        self.ensure_open()?;
        self.states.refresh(NodeId::root(), keep_changes)?;
        if !keep_changes {
            self.coordinator.clear_zombies();
        }
        Ok(())
    }

    pub fn undo(&self, root: NodeId) -> Result<()> {
        self.ensure_open()?;
        self.states.undo(root)?;
        self.coordinator.clear_zombies();
        Ok(())
    }

    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.states.has_pending_changes()
    }

    /// `Session.checkPermission(path, actions)` (spec §4.5).
    pub fn check_permission(&self, path: &str, actions: &[&str]) -> Result<bool> {
        self.ensure_open()?;
        let parsed = self.resolve_path(path)?;
        let actions: Vec<String> = actions.iter().map(|a| (*a).to_string()).collect();
        self.coordinator.check_permission(&parsed, &actions)
    }

    pub fn lock(&self, node: NodeId, is_deep: bool, is_session_scoped: bool) -> Result<LockInfo> {
        self.ensure_open()?;
        self.coordinator.lock(node, is_deep, is_session_scoped)
    }

    pub fn unlock(&self, node: NodeId) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.unlock(node)
    }

    pub fn checkin(&self, node: NodeId) -> Result<String> {
        self.ensure_open()?;
        self.coordinator.checkin(node)
    }

    pub fn checkout(&self, node: NodeId) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.checkout(node)
    }

    pub fn restore(&self, node: NodeId, version_label: &str) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.restore(node, version_label)
    }

    /// Remap a prefix for this session only, without touching the
    /// workspace-wide registration (spec §2).
    pub fn set_namespace_prefix(&self, prefix: &str, uri: &str) -> Result<()> {
        self.namespaces.write().register(prefix, uri)
    }

    /// `Workspace.registerNamespace` (spec §6): a workspace-wide
    /// registration, which this session also adopts locally.
    pub fn register_namespace(&self, prefix: &str, uri: &str) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.register_namespace(prefix, uri)?;
        self.set_namespace_prefix(prefix, uri)
    }

    pub fn unregister_namespace(&self, prefix: &str) -> Result<()> {
        self.ensure_open()?;
        self.coordinator.unregister_namespace(prefix)?;
        self.namespaces.write().unregister(prefix)
    }
}
