//! Node type definitions: the declared (non-aggregated) building blocks the
//! registry stores and the effective-type engine merges (spec §4.4).

use crate::{names::QName, value::PropertyType};

/// A property definition contributed by a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub name: QName,
    pub required_type: PropertyType,
    pub multiple: bool,
    pub mandatory: bool,
    pub protected: bool,
    pub auto_created: bool,
    /// Declared value constraints (e.g. numeric ranges, regexes); opaque
    /// strings, interpreted by the validator that owns the definition.
    pub value_constraints: Vec<String>,
}

impl PropertyDefinition {
    #[must_use]
    pub fn new(name: QName, required_type: PropertyType) -> Self {
        Self {
            name,
            required_type,
            multiple: false,
            mandatory: false,
            protected: false,
            auto_created: false,
            value_constraints: Vec::new(),
        }
    }

    /// Is `other` at least as restrictive as (or equal to) `self`? Used by
    /// [`super::effective::merge`] to pick the winner on a name collision.
    #[must_use]
    pub fn is_at_least_as_restrictive(&self, other: &Self) -> bool {
        let type_ok = other.required_type == self.required_type
            || other.required_type != PropertyType::Undefined && self.required_type == PropertyType::Undefined;
        let mandatory_ok = !self.mandatory || other.mandatory;
        let protected_ok = !self.protected || other.protected;
        type_ok && mandatory_ok && protected_ok
    }

    /// Are `self` and `other` compatible enough to be declared on the same
    /// effective type without raising `NodeTypeConflict`?
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.required_type == other.required_type
            || self.required_type == PropertyType::Undefined
            || other.required_type == PropertyType::Undefined
    }
}

/// A child-node definition contributed by a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildNodeDefinition {
    pub name: QName,
    pub required_primary_types: Vec<QName>,
    pub default_primary_type: Option<QName>,
    pub allows_same_name_siblings: bool,
    pub mandatory: bool,
    pub protected: bool,
    pub auto_created: bool,
}

impl ChildNodeDefinition {
    #[must_use]
    pub fn new(name: QName) -> Self {
        Self {
            name,
            required_primary_types: Vec::new(),
            default_primary_type: None,
            allows_same_name_siblings: false,
            mandatory: false,
            protected: false,
            auto_created: false,
        }
    }

    #[must_use]
    pub fn is_at_least_as_restrictive(&self, other: &Self) -> bool {
        let narrower_or_equal = other.required_primary_types.len() >= self.required_primary_types.len()
            && self
                .required_primary_types
                .iter()
                .all(|t| other.required_primary_types.contains(t));
        let sns_ok = self.allows_same_name_siblings || !other.allows_same_name_siblings;
        let mandatory_ok = !self.mandatory || other.mandatory;
        let protected_ok = !self.protected || other.protected;
        narrower_or_equal && sns_ok && mandatory_ok && protected_ok
    }
}

/// A declared node type definition (spec §4.4: "own the set of registered
/// node type definitions").
#[derive(Debug, Clone)]
pub struct NodeTypeDefinition {
    pub name: QName,
    pub declared_supertypes: Vec<QName>,
    pub is_mixin: bool,
    pub property_definitions: Vec<PropertyDefinition>,
    pub child_node_definitions: Vec<ChildNodeDefinition>,
}

impl NodeTypeDefinition {
    #[must_use]
    pub fn new(name: QName) -> Self {
        Self {
            name,
            declared_supertypes: Vec::new(),
            is_mixin: false,
            property_definitions: Vec::new(),
            child_node_definitions: Vec::new(),
        }
    }

    /// Every type name this definition's storage directly references: its
    /// declared supertypes plus any required primary types named by its
    /// child-node definitions. Used to build the registry's dependency
    /// index for `unregister` rejection.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<QName> {
        let mut names = self.declared_supertypes.clone();
        for cnd in &self.child_node_definitions {
            names.extend(cnd.required_primary_types.iter().cloned());
        }
        names
    }
}
