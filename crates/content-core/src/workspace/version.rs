//! Version lifecycle (SPEC_FULL.md §4.5 supplement): the smallest
//! collaborator that satisfies the round-trip property in spec §8
//! ("`checkin(); checkout()` preserves the property values of
//! `jcr:isCheckedOut == true`..."), following Design Notes §9's
//! enum-dispatched-builder direction, which names a no-op version manager
//! as a recognized configuration alongside a real one.

use std::sync::Mutex;

use dashmap::DashMap;

use crate::{id::NodeId, Error, Result};

/// `jcr:isCheckedOut` plus the minimal predecessor chain needed to make
/// `checkin`/`checkout`/`restore` round-trip.
#[derive(Debug, Clone)]
pub struct VersionState {
    pub is_checked_out: bool,
    pub predecessors: Vec<String>,
    pub labels: Vec<String>,
}

impl Default for VersionState {
    fn default() -> Self {
        Self { is_checked_out: true, predecessors: Vec::new(), labels: Vec::new() }
    }
}

/// Collaborator invoked by the Coordinator for `Checkin`/`Checkout`/`Restore`
/// operations. The default configuration wires [`NoopVersionManager`]; tests
/// that need the round-trip property use [`InMemoryVersionManager`].
pub trait VersionManager: Send + Sync {
    fn checkin(&self, node: NodeId) -> Result<String>;
    fn checkout(&self, node: NodeId) -> Result<()>;
    fn restore(&self, node: NodeId, version_label: &str) -> Result<()>;
    fn is_checked_out(&self, node: NodeId) -> bool;
}

/// Always fails: the source's recognized "no version support configured"
/// implementation (Design Notes §9).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVersionManager;

impl VersionManager for NoopVersionManager {
    fn checkin(&self, node: NodeId) -> Result<String> {
        Err(Error::NotSupportedOption(format!("versioning is not enabled for {node}")))
    }
    fn checkout(&self, _node: NodeId) -> Result<()> {
        Err(Error::NotSupportedOption("versioning is not enabled".into()))
    }
    fn restore(&self, _node: NodeId, _version_label: &str) -> Result<()> {
        Err(Error::NotSupportedOption("versioning is not enabled".into()))
    }
    fn is_checked_out(&self, _node: NodeId) -> bool {
        true
    }
}

/// A real, in-process version history keyed by node id: enough to exercise
/// the checkin/checkout round-trip property without a backing store.
#[derive(Default)]
pub struct InMemoryVersionManager {
    states: DashMap<NodeId, Mutex<VersionState>>,
}

impl InMemoryVersionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

}

impl VersionManager for InMemoryVersionManager {
    fn checkin(&self, node: NodeId) -> Result<String> {
        let entry = self.states.entry(node).or_default();
        let mut state = entry.lock().expect("version state mutex poisoned");
        if !state.is_checked_out {
            return Err(Error::VersionConflict(format!("{node} is already checked in")));
        }
        let label = format!("1.{}", state.predecessors.len());
        state.predecessors.push(label.clone());
        state.is_checked_out = false;
        Ok(label)
    }

    fn checkout(&self, node: NodeId) -> Result<()> {
        let entry = self.states.entry(node).or_default();
        let mut state = entry.lock().expect("version state mutex poisoned");
        if state.is_checked_out {
            return Err(Error::VersionConflict(format!("{node} is already checked out")));
        }
        state.is_checked_out = true;
        Ok(())
    }

    fn restore(&self, node: NodeId, version_label: &str) -> Result<()> {
        let entry = self.states.entry(node).or_default();
        let mut state = entry.lock().expect("version state mutex poisoned");
        if !state.predecessors.iter().any(|p| p == version_label) {
            return Err(Error::VersionConflict(format!("no version labeled `{version_label}` for {node}")));
        }
        state.is_checked_out = false;
        Ok(())
    }

    fn is_checked_out(&self, node: NodeId) -> bool {
        self.states.get(&node).map(|e| e.lock().expect("poisoned").is_checked_out).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkin_then_checkout_round_trips_checked_out_flag() {
        let manager = InMemoryVersionManager::new();
        let node = NodeId::new();
        assert!(manager.is_checked_out(node));
        let label = manager.checkin(node).expect("checkin");
        assert!(!manager.is_checked_out(node));
        manager.checkout(node).expect("checkout");
        assert!(manager.is_checked_out(node));
        assert_eq!(label, "1.0");
    }

    #[test]
    fn noop_manager_rejects_all_version_operations() {
        let manager = NoopVersionManager;
        assert!(manager.checkin(NodeId::root()).is_err());
        assert!(manager.checkout(NodeId::root()).is_err());
        assert!(manager.restore(NodeId::root(), "1.0").is_err());
    }
}
