//! Item Manager (spec §4.3): the façade cache and read-permission gate in
//! front of the Item State Layer and Caching Hierarchy Manager.

pub mod facade;
pub mod listener;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::instrument;

use crate::{
    hierarchy::HierarchyManager,
    id::{ItemId, NodeId, PropertyId},
    names::QName,
    path::{Path, PathElement},
    state::ItemStateManager,
    Error, Result,
};

pub use facade::{NodeFacade, NodeKind, PropertyFacade};
pub use listener::{LifecycleEvent, ListenerHandle, ListenerRegistry};

/// A fetched item, either flavor.
#[derive(Debug, Clone)]
pub enum Item {
    Node(NodeFacade),
    Property(PropertyFacade),
}

impl Item {
    #[must_use]
    pub const fn as_node(&self) -> Option<&NodeFacade> {
        match self {
            Self::Node(n) => Some(n),
            Self::Property(_) => None,
        }
    }

    #[must_use]
    pub const fn as_property(&self) -> Option<&PropertyFacade> {
        match self {
            Self::Property(p) => Some(p),
            Self::Node(_) => None,
        }
    }
}

/// Decides whether the current session may read a given item (spec §4.3,
/// Open Question: `canAccess` iterates its configured checks and returns
/// `true` as soon as one matches, `false` only if none do — see
/// `DESIGN.md` for why a permissive default is safe for this engine).
pub trait AccessManager: Send + Sync {
    fn can_access(&self, item: &ItemId) -> bool;
}

/// Grants access unconditionally; the default for configurations that
/// have not wired an authorization policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveAccessManager;

impl AccessManager for PermissiveAccessManager {
    fn can_access(&self, _item: &ItemId) -> bool {
        true
    }
}

type AccessCheck = Box<dyn Fn(&ItemId) -> bool + Send + Sync>;

/// Evaluates a list of independent checks, granting access as soon as any
/// one of them returns `true` (the literal "iterate, return true on
/// match" policy named in spec §4.3's Open Question).
#[derive(Default)]
pub struct CompositeAccessManager {
    checks: Vec<AccessCheck>,
}

impl CompositeAccessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ItemId) -> bool + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }
}

impl AccessManager for CompositeAccessManager {
    fn can_access(&self, item: &ItemId) -> bool {
        self.checks.iter().any(|check| check(item))
    }
}

/// Owns the façade cache and mediates every read between a session and the
/// Item State Layer / Caching Hierarchy Manager.
pub struct ItemManager {
    states: Arc<ItemStateManager>,
    hierarchy: Arc<dyn HierarchyManager>,
    access: Arc<dyn AccessManager>,
    facades: DashMap<ItemId, Item>,
    listeners: ListenerRegistry,
}

impl ItemManager {
    #[must_use]
    pub fn new(states: Arc<ItemStateManager>, hierarchy: Arc<dyn HierarchyManager>, access: Arc<dyn AccessManager>) -> Self {
        Self {
            states,
            hierarchy,
            access,
            facades: DashMap::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Invalidate a cached façade, e.g. after a mutation changes the
    /// underlying state (spec §4.3: façade entries are correct only until
    /// the item state they were built from changes), and project that
    /// change into the façade lifecycle (`itemInvalidated`, spec §4.3
    /// "Lifecycle coupling").
    pub fn invalidate(&self, id: &ItemId) {
        self.facades.remove(id);
        self.listeners.notify(&LifecycleEvent::Modified(id.clone()));
    }

    /// Fire `itemCreated` for a freshly allocated id. The façade itself is
    /// built lazily on the next `get_item`, so this only notifies.
    pub fn notify_created(&self, id: &ItemId) {
        self.listeners.notify(&LifecycleEvent::Created(id.clone()));
    }

    /// Evict a façade and fire `itemDestroyed` (spec §4.3: "on
    /// `itemDestroyed` it is evicted"), for ids leaving the overlay for
    /// good rather than merely changing.
    pub fn notify_removed(&self, id: &ItemId) {
        self.facades.remove(id);
        self.listeners.notify(&LifecycleEvent::Removed(id.clone()));
    }

    #[instrument(skip(self))]
    pub fn get_item(&self, id: &ItemId) -> Result<Item> {
        if !self.access.can_access(id) {
            return Err(Error::AccessDenied(id.to_string()));
        }
        if let Some(cached) = self.facades.get(id) {
            return Ok(cached.value().clone());
        }

        let state = self.states.get_item_state(id)?;
        // An item removed in this session, saved-removed, or whose
        // persistent counterpart was destroyed externally is no longer
        // visible through ordinary access, only through the hierarchy's
        // include-removed ("zombie") mode (spec §4.2).
        if !state.status().is_live() {
            return Err(Error::ItemNotFound(id.to_string()));
        }
        let item = match id {
            ItemId::Node(node_id) => {
                let path = self.hierarchy.resolve_id(*node_id)?;
                NodeFacade::from_state(path, &state)
                    .map(Item::Node)
                    .ok_or_else(|| Error::ItemNotFound(id.to_string()))?
            }
            ItemId::Property(_) => PropertyFacade::from_state(&state)
                .map(Item::Property)
                .ok_or_else(|| Error::ItemNotFound(id.to_string()))?,
        };
        self.facades.insert(id.clone(), item.clone());
        Ok(item)
    }

    #[must_use]
    pub fn item_exists(&self, id: &ItemId) -> bool {
        match self.get_item(id) {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(_) => false,
        }
    }

    pub fn get_child_nodes(&self, parent: NodeId) -> Result<Vec<NodeFacade>> {
        let parent_state = self.states.get_item_state(&ItemId::Node(parent))?;
        let Some(node) = parent_state.as_node() else {
            return Err(Error::ItemNotFound(parent.to_string()));
        };
        let mut out = Vec::with_capacity(node.child_entries.len());
        for entry in &node.child_entries {
            // A child pending removal in this session is skipped rather
            // than failing the whole listing (spec §4.2 "current" mode
            // simply does not enumerate it).
            match self.get_item(&ItemId::Node(entry.child_id)) {
                Ok(Item::Node(facade)) => out.push(facade),
                Ok(Item::Property(_)) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub fn get_child_properties(&self, parent: NodeId) -> Result<Vec<PropertyFacade>> {
        let parent_state = self.states.get_item_state(&ItemId::Node(parent))?;
        let Some(node) = parent_state.as_node() else {
            return Err(Error::ItemNotFound(parent.to_string()));
        };
        let mut out = Vec::with_capacity(node.property_names.len());
        for name in &node.property_names {
            let id = ItemId::Property(PropertyId::new(parent, name.clone()));
            match self.get_item(&id) {
                Ok(Item::Property(facade)) => out.push(facade),
                Ok(Item::Node(_)) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Build an absolute path for a child name under `parent`, used by
    /// callers constructing ids before the child itself is cached.
    #[must_use]
    pub fn child_path(&self, parent: NodeId, name: QName, index: u32) -> Result<Path> {
        let parent_path = self.hierarchy.resolve_id(parent)?;
        Ok(parent_path.child(PathElement::new(name, index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hierarchy::CachingHierarchyManager,
        state::{NodeState, Status},
        value::{PropertyType, Value},
    };

    fn manager_with(hierarchy: Arc<dyn HierarchyManager>) -> (ItemManager, Arc<ItemStateManager>) {
        let states = Arc::new(ItemStateManager::new());
        let manager = ItemManager::new(states.clone(), hierarchy, Arc::new(PermissiveAccessManager));
        (manager, states)
    }

    fn noop_hierarchy() -> Arc<dyn HierarchyManager> {
        Arc::new(CachingHierarchyManager::new(
            16,
            move |_p| Err(Error::PathNotFound("unused".into())),
            move |_n| Ok(Path::root()),
        ))
    }

    #[test]
    fn get_item_caches_facade() {
        let (manager, states) = manager_with(noop_hierarchy());
        let node = NodeId::new();
        states
            .create_transient(crate::state::ItemState::new_node(
                node,
                None,
                Status::Existing,
                NodeState::new(QName::unprefixed("nt:base")),
            ))
            .expect("create");

        let first = manager.get_item(&ItemId::Node(node)).expect("fetched");
        manager.invalidate(&ItemId::Node(node));
        let second = manager.get_item(&ItemId::Node(node)).expect("re-fetched after invalidation");
        assert!(first.as_node().is_some());
        assert!(second.as_node().is_some());
    }

    #[test]
    fn denied_access_surfaces_as_access_denied() {
        let states = Arc::new(ItemStateManager::new());
        let denier: Arc<dyn AccessManager> = Arc::new(CompositeAccessManager::new());
        let manager = ItemManager::new(states, noop_hierarchy(), denier);
        let result = manager.get_item(&ItemId::Node(NodeId::root()));
        assert!(matches!(result, Err(Error::AccessDenied(_))));
    }

    #[test]
    fn invalidate_notify_created_and_notify_removed_fire_matching_lifecycle_events() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (manager, _states) = manager_with(noop_hierarchy());
        let node = ItemId::Node(NodeId::new());

        let created = Arc::new(AtomicUsize::new(0));
        let modified = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let (c, m, r) = (created.clone(), modified.clone(), removed.clone());
        manager.listeners().register(move |event| match event {
            LifecycleEvent::Created(_) => {
                c.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::Modified(_) => {
                m.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::Removed(_) => {
                r.fetch_add(1, Ordering::Relaxed);
            }
        });

        manager.notify_created(&node);
        manager.invalidate(&node);
        manager.notify_removed(&node);

        assert_eq!(created.load(Ordering::Relaxed), 1);
        assert_eq!(modified.load(Ordering::Relaxed), 1);
        assert_eq!(removed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn child_properties_are_collected_in_declared_order() {
        let (manager, states) = manager_with(noop_hierarchy());
        let node = NodeId::root();
        let mut root_node = NodeState::new(QName::unprefixed("nt:base"));
        root_node.property_names.push(QName::unprefixed("p"));
        states
            .create_transient(crate::state::ItemState::new_node(node, None, Status::Existing, root_node))
            .expect("create");
        let mut prop = crate::state::PropertyState::new(PropertyType::Long, false);
        prop.values.push(Value::from(7_i64));
        states
            .create_transient(crate::state::ItemState::new_property(
                PropertyId::new(node, QName::unprefixed("p")),
                Status::Existing,
                prop,
            ))
            .expect("create");

        let props = manager.get_child_properties(node).expect("properties");
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].value().and_then(|v| v.as_long().ok()), Some(7));
    }
}
