//! Effective Node Type aggregation (spec §4.4): merging a node's primary
//! type and mixins into one queryable view, with a cache keyed by the
//! constituent type-name set so repeated aggregations are free.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    names::QName,
    nodetype::definition::{ChildNodeDefinition, NodeTypeDefinition, PropertyDefinition},
    Error, Result,
};

/// Counts single-type effective-type builds, so tests and benchmarks can
/// assert the aggregation cache is actually saving work (spec §8 S3).
pub static SINGLE_TYPE_BUILDS: AtomicU64 = AtomicU64::new(0);

/// The sorted set of constituent type names an [`EffectiveNodeType`] was
/// built from, used as both cache key and "weight" (the set's size) for
/// the greedy covering step in [`aggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeightedKey(Vec<QName>);

impl WeightedKey {
    #[must_use]
    pub fn from_names(names: &[QName]) -> Self {
        let mut sorted: Vec<QName> = names.to_vec();
        sorted.sort();
        sorted.dedup();
        Self(sorted)
    }

    #[must_use]
    pub fn weight(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn names(&self) -> &[QName] {
        &self.0
    }
}

/// The merged view of a node's primary type and all mixins: the union of
/// supertypes, and for each property/child-node name the most restrictive
/// definition across all constituent types (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct EffectiveNodeType {
    key: Option<WeightedKey>,
    type_names: Vec<QName>,
    properties: HashMap<QName, PropertyDefinition>,
    child_nodes: HashMap<QName, ChildNodeDefinition>,
}

impl EffectiveNodeType {
    fn single(def: &NodeTypeDefinition) -> Self {
        SINGLE_TYPE_BUILDS.fetch_add(1, Ordering::Relaxed);
        let mut properties = HashMap::new();
        for p in &def.property_definitions {
            properties.insert(p.name.clone(), p.clone());
        }
        let mut child_nodes = HashMap::new();
        for c in &def.child_node_definitions {
            child_nodes.insert(c.name.clone(), c.clone());
        }
        Self {
            key: Some(WeightedKey::from_names(&[def.name.clone()])),
            type_names: vec![def.name.clone()],
            properties,
            child_nodes,
        }
    }

    #[must_use]
    pub fn key(&self) -> Option<&WeightedKey> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn type_names(&self) -> &[QName] {
        &self.type_names
    }

    #[must_use]
    pub fn is_node_type(&self, name: &QName) -> bool {
        self.type_names.contains(name)
    }

    #[must_use]
    pub fn property_definition(&self, name: &QName) -> Option<&PropertyDefinition> {
        self.properties.get(name)
    }

    #[must_use]
    pub fn child_node_definition(&self, name: &QName) -> Option<&ChildNodeDefinition> {
        self.child_nodes.get(name)
    }

    #[must_use]
    pub fn property_definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.values()
    }

    #[must_use]
    pub fn child_node_definitions(&self) -> impl Iterator<Item = &ChildNodeDefinition> {
        self.child_nodes.values()
    }

    #[must_use]
    pub fn mandatory_property_names(&self) -> Vec<QName> {
        self.properties
            .values()
            .filter(|p| p.mandatory)
            .map(|p| p.name.clone())
            .collect()
    }

    #[must_use]
    pub fn mandatory_child_node_names(&self) -> Vec<QName> {
        self.child_nodes
            .values()
            .filter(|c| c.mandatory)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Merge two effective types, failing if any shared property or child-node
/// name carries incompatible definitions (spec §4.4 `NodeTypeConflict`).
pub fn merge(a: EffectiveNodeType, b: EffectiveNodeType) -> Result<EffectiveNodeType> {
    let mut type_names = a.type_names;
    for n in b.type_names {
        if !type_names.contains(&n) {
            type_names.push(n);
        }
    }
    let key = Some(WeightedKey::from_names(&type_names));

    let mut properties = a.properties;
    for (name, def) in b.properties {
        match properties.remove(&name) {
            Some(existing) => {
                if !existing.is_compatible_with(&def) {
                    return Err(Error::NodeTypeConflict(format!(
                        "property `{name}` declared with incompatible types across merged node types"
                    )));
                }
                let winner = if existing.is_at_least_as_restrictive(&def) {
                    existing
                } else {
                    def
                };
                properties.insert(name, winner);
            }
            None => {
                properties.insert(name, def);
            }
        }
    }

    let mut child_nodes = a.child_nodes;
    for (name, def) in b.child_nodes {
        match child_nodes.remove(&name) {
            Some(existing) => {
                let winner = if existing.is_at_least_as_restrictive(&def) {
                    existing
                } else {
                    def
                };
                child_nodes.insert(name, winner);
            }
            None => {
                child_nodes.insert(name, def);
            }
        }
    }

    Ok(EffectiveNodeType {
        key,
        type_names,
        properties,
        child_nodes,
    })
}

/// Build the effective type for `names`, reusing the largest cached
/// aggregate that fits (greedy set cover) before falling back to
/// single-type builds for whatever remains (spec §4.4 steps 1-4).
///
/// `lookup` resolves a single type name to its declaration; `cache` reads
/// an existing aggregate for a given key, if the registry already built
/// one covering it.
pub fn aggregate<'a, L, C>(names: &[QName], lookup: L, cache: C) -> Result<EffectiveNodeType>
where
    L: Fn(&QName) -> Option<&'a NodeTypeDefinition>,
    C: Fn(&WeightedKey) -> Option<EffectiveNodeType>,
{
    let target = WeightedKey::from_names(names);
    if let Some(hit) = cache(&target) {
        return Ok(hit);
    }

    let mut remaining: Vec<QName> = target.names().to_vec();
    let mut acc: Option<EffectiveNodeType> = None;

    // Greedily fold in the largest already-cached aggregate that is a
    // subset of what's left, shrinking the set of single-type builds
    // needed to complete the aggregation. For each candidate size, probe
    // every contiguous *window* of `remaining` (not just its leading
    // prefix, which is all the original scan tried) and, crucially, every
    // individual name at weight 1 — a single-type aggregate built by an
    // earlier, independent `aggregate([name])` call is exactly the case
    // spec §8 S3 requires reusing. Enumerating windows instead of every
    // subset keeps this O(n^2) rather than the O(2^n) a full powerset scan
    // would cost for a node with many mixins.
    let mut progressed = true;
    while progressed && !remaining.is_empty() {
        progressed = false;
        let mut candidate_key: Option<WeightedKey> = None;
        let mut candidate_weight = 0;
        'sizes: for size in (1..=remaining.len()).rev() {
            if size <= candidate_weight {
                break;
            }
            if size == 1 {
                for name in &remaining {
                    let probe = WeightedKey::from_names(std::slice::from_ref(name));
                    if cache(&probe).is_some() {
                        candidate_weight = 1;
                        candidate_key = Some(probe);
                        break 'sizes;
                    }
                }
            } else {
                for window in remaining.windows(size) {
                    let probe = WeightedKey::from_names(window);
                    if cache(&probe).is_some() {
                        candidate_weight = probe.weight();
                        candidate_key = Some(probe);
                        break 'sizes;
                    }
                }
            }
        }
        if let Some(key) = candidate_key {
            if let Some(ent) = cache(&key) {
                acc = Some(match acc {
                    Some(existing) => merge(existing, ent)?,
                    None => ent,
                });
                remaining.retain(|n| !key.names().contains(n));
                progressed = true;
            }
        }
    }

    for name in remaining {
        let singleton = WeightedKey::from_names(std::slice::from_ref(&name));
        let single = match cache(&singleton) {
            Some(cached) => cached,
            None => {
                let def = lookup(&name).ok_or_else(|| Error::NoSuchNodeType(name.to_string()))?;
                EffectiveNodeType::single(def)
            }
        };
        acc = Some(match acc {
            Some(existing) => merge(existing, single)?,
            None => single,
        });
    }

    let mut result = acc.unwrap_or_default();
    result.key = Some(target);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NodeTypeDefinition {
        let mut def = NodeTypeDefinition::new(QName::unprefixed("nt:base"));
        def.property_definitions.push(PropertyDefinition::new(
            QName::unprefixed("jcr:primaryType"),
            crate::value::PropertyType::Name,
        ));
        def
    }

    fn referenceable() -> NodeTypeDefinition {
        let mut def = NodeTypeDefinition::new(QName::unprefixed("mix:referenceable"));
        def.is_mixin = true;
        let mut uuid_prop =
            PropertyDefinition::new(QName::unprefixed("jcr:uuid"), crate::value::PropertyType::String);
        uuid_prop.mandatory = true;
        uuid_prop.protected = true;
        def.property_definitions.push(uuid_prop);
        def
    }

    #[test]
    fn single_type_aggregate_contains_its_own_properties() {
        let base = base();
        let names = [base.name.clone()];
        let ent = aggregate(&names, |n| if *n == base.name { Some(&base) } else { None }, |_| None).expect("ok");
        assert!(ent.property_definition(&QName::unprefixed("jcr:primaryType")).is_some());
    }

    #[test]
    fn merge_unions_mandatory_properties_from_mixins() {
        let base = base();
        let mix = referenceable();
        let a = EffectiveNodeType::single(&base);
        let b = EffectiveNodeType::single(&mix);
        let merged = merge(a, b).expect("compatible");
        assert!(merged.mandatory_property_names().contains(&QName::unprefixed("jcr:uuid")));
        assert_eq!(merged.type_names().len(), 2);
    }

    #[test]
    fn incompatible_property_types_conflict() {
        let mut a = NodeTypeDefinition::new(QName::unprefixed("a"));
        a.property_definitions.push(PropertyDefinition::new(
            QName::unprefixed("x"),
            crate::value::PropertyType::String,
        ));
        let mut b = NodeTypeDefinition::new(QName::unprefixed("b"));
        b.property_definitions.push(PropertyDefinition::new(
            QName::unprefixed("x"),
            crate::value::PropertyType::Long,
        ));
        let result = merge(EffectiveNodeType::single(&a), EffectiveNodeType::single(&b));
        assert!(result.is_err());
    }

    #[test]
    fn cache_hit_avoids_single_type_rebuild() {
        let base = base();
        let names = [base.name.clone()];
        let cached = EffectiveNodeType::single(&base);
        let before = SINGLE_TYPE_BUILDS.load(Ordering::Relaxed);
        let ent = aggregate(&names, |_| None, |k| if k.weight() == 1 { Some(cached.clone()) } else { None })
            .expect("cache hit, lookup never called");
        assert_eq!(SINGLE_TYPE_BUILDS.load(Ordering::Relaxed), before);
        assert_eq!(ent.type_names().len(), 1);
    }

    #[test]
    fn aggregating_a_new_combination_reuses_both_cached_single_type_aggregates() {
        // Mirrors spec §8 S3 at the `aggregate` level: {A} and {B} were each
        // aggregated independently before, so {A, B} must reuse both cached
        // singletons and never call `lookup` or rebuild either from scratch.
        let base = base();
        let mix = referenceable();
        let cached_base = EffectiveNodeType::single(&base);
        let cached_mix = EffectiveNodeType::single(&mix);
        let before = SINGLE_TYPE_BUILDS.load(Ordering::Relaxed);

        let names = [base.name.clone(), mix.name.clone()];
        let ent = aggregate(
            &names,
            |_| panic!("lookup must not be called; both singletons are cached"),
            |k| match k.names() {
                [only] if *only == base.name => Some(cached_base.clone()),
                [only] if *only == mix.name => Some(cached_mix.clone()),
                _ => None,
            },
        )
        .expect("reuses both cached singletons");

        assert_eq!(SINGLE_TYPE_BUILDS.load(Ordering::Relaxed), before);
        assert!(ent.is_node_type(&base.name));
        assert!(ent.is_node_type(&mix.name));
    }
}
