//! Node-Type Registry and Effective Node Type engine (spec §4.4).

pub mod definition;
pub mod effective;
pub mod registry;

pub use definition::{ChildNodeDefinition, NodeTypeDefinition, PropertyDefinition};
pub use effective::EffectiveNodeType;
pub use registry::{bootstrap_registry, NodeTypeRegistry, RootNodeDescriptor};
