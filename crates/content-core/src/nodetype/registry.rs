//! The node-type registry: owns declared definitions, the root node
//! definition, and the effective-type cache, and enforces them against
//! transient states on save (spec §4.4).

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    names::QName,
    nodetype::{
        definition::{ChildNodeDefinition, NodeTypeDefinition},
        effective::{self, EffectiveNodeType, WeightedKey},
    },
    state::{manager::StateValidator, ItemState},
    value::PropertyType,
    Error, Result,
};

/// Describes the root node's fixed primary type, installed once at startup
/// and never mutated afterward (spec §4.4: "the root node definition is a
/// distinguished, load-once descriptor").
#[derive(Debug, Clone)]
pub struct RootNodeDescriptor {
    pub primary_type: QName,
}

impl Default for RootNodeDescriptor {
    fn default() -> Self {
        Self {
            primary_type: QName::unprefixed("rep:root"),
        }
    }
}

#[derive(Default)]
struct Registry {
    definitions: HashMap<QName, NodeTypeDefinition>,
    /// type name -> names of types that declare it as a supertype or
    /// required primary type, used to reject `unregister` (spec §4.4).
    dependents: HashMap<QName, HashSet<QName>>,
}

/// Owns registered node type definitions and the effective-type cache.
/// Implements [`StateValidator`] so [`crate::state::ItemStateManager::save`]
/// can check transient states against their effective type before
/// submitting a change log.
pub struct NodeTypeRegistry {
    registry: RwLock<Registry>,
    ent_cache: DashMap<WeightedKey, EffectiveNodeType>,
    root: RootNodeDescriptor,
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new(RootNodeDescriptor::default())
    }
}

impl NodeTypeRegistry {
    #[must_use]
    pub fn new(root: RootNodeDescriptor) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            ent_cache: DashMap::new(),
            root,
        }
    }

    #[must_use]
    pub const fn root(&self) -> &RootNodeDescriptor {
        &self.root
    }

    /// Register a new node type definition (spec §4.4). Fails if a
    /// declared supertype or required primary type is not already
    /// registered, or if the name is already taken (use `reregister`).
    #[tracing::instrument(skip(self, def), fields(name = %def.name))]
    pub fn register(&self, def: NodeTypeDefinition) -> Result<()> {
        let mut reg = self.registry.write();
        if reg.definitions.contains_key(&def.name) {
            return Err(Error::ConstraintViolation(format!(
                "node type `{}` is already registered, use reregister",
                def.name
            )));
        }
        Self::check_dependencies_exist(&reg, &def)?;
        Self::insert_locked(&mut reg, def);
        Ok(())
    }

    /// Atomically replace an existing definition, evicting every cached
    /// effective type that references it (spec §4.4: "reregister is
    /// atomic with respect to the ENT cache").
    #[tracing::instrument(skip(self, def), fields(name = %def.name))]
    pub fn reregister(&self, def: NodeTypeDefinition) -> Result<()> {
        let mut reg = self.registry.write();
        if !reg.definitions.contains_key(&def.name) {
            return Err(Error::NoSuchNodeType(def.name.to_string()));
        }
        Self::check_dependencies_exist(&reg, &def)?;
        self.evict_referencing(&def.name);
        Self::insert_locked(&mut reg, def);
        Ok(())
    }

    /// Remove a definition. Rejected if any other registered type still
    /// depends on it (Open Question: resolved as "reject unconditionally",
    /// see `DESIGN.md` — no mandated scan of live content for usages,
    /// since this registry has no visibility into workspace content).
    #[tracing::instrument(skip(self))]
    pub fn unregister(&self, name: &QName) -> Result<()> {
        let mut reg = self.registry.write();
        if !reg.definitions.contains_key(name) {
            return Err(Error::NoSuchNodeType(name.to_string()));
        }
        if let Some(dependents) = reg.dependents.get(name) {
            if !dependents.is_empty() {
                return Err(Error::ConstraintViolation(format!(
                    "node type `{name}` is referenced by {dependents:?} and cannot be unregistered"
                )));
            }
        }
        reg.definitions.remove(name);
        for deps in reg.dependents.values_mut() {
            deps.remove(name);
        }
        drop(reg);
        self.evict_referencing(name);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &QName) -> Option<NodeTypeDefinition> {
        self.registry.read().definitions.get(name).cloned()
    }

    #[must_use]
    pub fn is_registered(&self, name: &QName) -> bool {
        self.registry.read().definitions.contains_key(name)
    }

    /// Build (or reuse from cache) the effective node type for the given
    /// primary type plus mixins.
    pub fn effective_type(&self, names: &[QName]) -> Result<EffectiveNodeType> {
        let key = WeightedKey::from_names(names);
        if let Some(hit) = self.ent_cache.get(&key) {
            return Ok(hit.clone());
        }
        let reg = self.registry.read();
        let ent = effective::aggregate(
            names,
            |n| reg.definitions.get(n),
            |k| self.ent_cache.get(k).map(|e| e.clone()),
        )?;
        drop(reg);
        self.ent_cache.insert(key, ent.clone());
        Ok(ent)
    }

    fn evict_referencing(&self, name: &QName) {
        let before = self.ent_cache.len();
        self.ent_cache.retain(|key, _| !key.names().contains(name));
        let evicted = before - self.ent_cache.len();
        if evicted > 0 {
            debug!(%name, evicted, "evicted effective-type cache entries referencing node type");
        }
    }

    fn check_dependencies_exist(reg: &Registry, def: &NodeTypeDefinition) -> Result<()> {
        for dep in def.dependency_names() {
            if !reg.definitions.contains_key(&dep) {
                return Err(Error::NoSuchNodeType(format!(
                    "`{}` declares a dependency on unregistered type `{dep}`",
                    def.name
                )));
            }
        }
        Ok(())
    }

    fn insert_locked(reg: &mut Registry, def: NodeTypeDefinition) {
        let name = def.name.clone();
        for dep in def.dependency_names() {
            reg.dependents.entry(dep).or_default().insert(name.clone());
        }
        reg.definitions.insert(name, def);
    }
}

impl StateValidator for NodeTypeRegistry {
    fn validate(&self, state: &ItemState) -> Result<()> {
        let Some(node) = state.as_node() else {
            return Ok(());
        };
        let names = node.all_type_names();
        for name in &names {
            if !self.is_registered(name) {
                return Err(Error::NoSuchNodeType(name.to_string()));
            }
        }
        let ent = self.effective_type(&names)?;

        for mandatory in ent.mandatory_property_names() {
            if !node.property_names.contains(&mandatory) {
                return Err(Error::ConstraintViolation(format!(
                    "mandatory property `{mandatory}` is missing"
                )));
            }
        }
        for mandatory in ent.mandatory_child_node_names() {
            if !node.child_entries.iter().any(|e| e.name == mandatory) {
                return Err(Error::ConstraintViolation(format!(
                    "mandatory child node `{mandatory}` is missing"
                )));
            }
        }

        for entry in &node.child_entries {
            if entry.index > 1 {
                match ent.child_node_definition(&entry.name) {
                    Some(def) if def.allows_same_name_siblings => {}
                    Some(_) => {
                        return Err(Error::ConstraintViolation(format!(
                            "child node `{}` does not allow same-name siblings",
                            entry.name
                        )))
                    }
                    None => warn!(name = %entry.name, "child node has no matching definition, allowing residual entry"),
                }
            }
            if node.has_name_collision(&entry.name) {
                return Err(Error::ConstraintViolation(format!(
                    "`{}` names both a property and a child node",
                    entry.name
                )));
            }
        }

        Ok(())
    }
}

/// Build the `nt:base`-equivalent seed registry used by default
/// configurations and tests: a single unconstrained root type so new
/// repositories have something to register nodes against immediately.
#[must_use]
pub fn bootstrap_registry() -> NodeTypeRegistry {
    let registry = NodeTypeRegistry::default();
    let mut base = NodeTypeDefinition::new(QName::unprefixed("nt:base"));
    base.property_definitions.push(crate::nodetype::definition::PropertyDefinition::new(
        QName::unprefixed("jcr:primaryType"),
        PropertyType::Name,
    ));
    base.child_node_definitions.push(ChildNodeDefinition::new(QName::unprefixed("*")));
    registry.register(base).expect("bootstrap registration cannot fail");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        id::NodeId,
        nodetype::definition::PropertyDefinition,
        state::{NodeState, Status},
    };

    #[test]
    fn register_rejects_duplicate_name() {
        let registry = bootstrap_registry();
        let dup = NodeTypeDefinition::new(QName::unprefixed("nt:base"));
        assert!(registry.register(dup).is_err());
    }

    #[test]
    fn register_rejects_missing_supertype() {
        let registry = NodeTypeRegistry::default();
        let mut def = NodeTypeDefinition::new(QName::unprefixed("my:type"));
        def.declared_supertypes.push(QName::unprefixed("nt:base"));
        assert!(registry.register(def).is_err());
    }

    #[test]
    fn unregister_rejected_while_referenced() {
        let registry = NodeTypeRegistry::default();
        registry
            .register(NodeTypeDefinition::new(QName::unprefixed("nt:base")))
            .expect("ok");
        let mut child = NodeTypeDefinition::new(QName::unprefixed("nt:folder"));
        let mut cnd = ChildNodeDefinition::new(QName::unprefixed("*"));
        cnd.required_primary_types.push(QName::unprefixed("nt:base"));
        child.child_node_definitions.push(cnd);
        registry.register(child).expect("ok");

        assert!(registry.unregister(&QName::unprefixed("nt:base")).is_err());
    }

    #[test]
    fn reregister_evicts_cached_effective_type() {
        let registry = bootstrap_registry();
        let names = [QName::unprefixed("nt:base")];
        let first = registry.effective_type(&names).expect("ok");
        assert!(first.property_definition(&QName::unprefixed("jcr:uuid")).is_none());

        let mut replacement = NodeTypeDefinition::new(QName::unprefixed("nt:base"));
        let mut uuid_prop = PropertyDefinition::new(QName::unprefixed("jcr:uuid"), PropertyType::String);
        uuid_prop.mandatory = true;
        replacement.property_definitions.push(uuid_prop);
        registry.reregister(replacement).expect("ok");

        let second = registry.effective_type(&names).expect("ok");
        assert!(second.property_definition(&QName::unprefixed("jcr:uuid")).is_some());
    }

    #[test]
    fn validate_rejects_missing_mandatory_property() {
        let registry = NodeTypeRegistry::default();
        let mut def = NodeTypeDefinition::new(QName::unprefixed("my:type"));
        let mut required = PropertyDefinition::new(QName::unprefixed("my:required"), PropertyType::String);
        required.mandatory = true;
        def.property_definitions.push(required);
        registry.register(def).expect("ok");

        let node = NodeState::new(QName::unprefixed("my:type"));
        let state = ItemState::new_node(NodeId::new(), None, Status::New, node);
        assert!(registry.validate(&state).is_err());
    }

    #[test]
    fn validate_rejects_a_property_and_child_node_sharing_a_name() {
        let registry = bootstrap_registry();
        let mut node = NodeState::new(QName::unprefixed("nt:base"));
        let clashing = QName::unprefixed("clash");
        node.property_names.push(clashing.clone());
        node.child_entries.push(crate::state::ChildNodeEntry {
            name: clashing,
            index: 1,
            child_id: NodeId::new(),
        });
        let state = ItemState::new_node(NodeId::new(), None, Status::New, node);
        assert!(matches!(registry.validate(&state), Err(Error::ConstraintViolation(_))));
    }
}
