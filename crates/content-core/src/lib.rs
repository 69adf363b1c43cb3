//! content-core — a session-scoped, JCR-style hierarchical content engine.
//!
//! This crate provides:
//! - The Item State Layer: a per-session transient overlay with the
//!   `New → Existing → ExistingModified → ...` status automaton ([`state`])
//! - The Caching Hierarchy Manager: path/id resolution backed by a shared,
//!   event-invalidated cache ([`hierarchy`])
//! - The Item Manager: the façade cache and read-permission gate
//!   ([`itemmgr`])
//! - The Node-Type Registry and effective-type aggregation engine
//!   ([`nodetype`])
//! - The Workspace Coordinator: the async Repository Service boundary,
//!   change feed, and lock manager ([`workspace`])
//! - `Session`: the object application code binds all of the above through
//!   ([`session`])

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod id;
pub mod itemmgr;
pub mod names;
pub mod nodetype;
pub mod path;
pub mod session;
pub mod state;
pub mod value;
pub mod workspace;

#[cfg(test)]
mod config_property_tests;

pub use error::{Error, Result};
pub use id::{ItemId, NodeId, PropertyId};
pub use names::{NamespaceResolver, QName};
pub use path::{Path, PathElement};
pub use session::Session;
pub use value::{PropertyType, Value};
