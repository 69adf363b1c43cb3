//! The Repository Service boundary (spec §6): the outbound RPC surface to
//! the backing store. Everything in this crate upstream of `workspace`
//! depends only on the traits in `state::manager` and `hierarchy`; this is
//! the one place that knows it is actually talking to something remote.

use async_trait::async_trait;

use crate::{
    id::{ItemId, NodeId, PropertyId},
    names::QName,
    nodetype::definition::NodeTypeDefinition,
    path::Path,
    value::Value,
    Result,
};

/// Opaque session handle returned by `login`/`obtain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub workspace_name: String,
}

/// The persistent snapshot of a node, as reported by `getNodeInfo`.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub primary_type: QName,
    pub mixin_types: Vec<QName>,
    pub property_names: Vec<QName>,
    pub child_entries: Vec<ChildInfo>,
}

/// One entry of `getChildInfos`: a child's name, SNS index and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInfo {
    pub name: QName,
    pub index: u32,
    pub id: NodeId,
}

/// The persistent snapshot of either item flavor, as reported by
/// `getItemInfo`.
#[derive(Debug, Clone)]
pub enum ItemInfo {
    Node(NodeInfo),
    Property { id: PropertyId, values: Vec<Value> },
}

/// `(key, value)` pairs describing the backing store's capabilities
/// (`getRepositoryDescriptors`).
pub type RepositoryDescriptors = std::collections::HashMap<String, String>;

/// `(holderNodeId, owner, isDeep, isSessionScoped, lockToken?)` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub holder: NodeId,
    pub owner: String,
    pub is_deep: bool,
    pub is_session_scoped: bool,
    pub token: Option<String>,
}

/// A listener-side subscription descriptor passed to `createEventFilter`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub path: Option<Path>,
    pub is_deep: bool,
    pub node_type_names: Vec<QName>,
    pub uuids: Vec<NodeId>,
}

/// One observed change, as delivered by `getEvents` (spec §4.2's six
/// invalidation-rule inputs, widened with the id needed to apply them).
#[derive(Debug, Clone)]
pub enum RepositoryEvent {
    NodeAdded { parent: NodeId, name: QName, index: u32, child: NodeId },
    NodeRemoved { parent: NodeId, name: QName, index: u32, child: NodeId },
    NodesReplaced { parent: NodeId },
    PropertyChanged { id: PropertyId },
    StateDestroyed { node: NodeId },
}

/// A bundle of events returned by one `getEvents` poll.
#[derive(Debug, Clone, Default)]
pub struct EventBundle {
    pub events: Vec<RepositoryEvent>,
}

/// An opened batch: operations are staged with `addNode`/`addProperty`/etc.
/// and applied atomically by `submit` (spec §4.5: "create batch, apply
/// visits in order, submit").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub u64);

/// The outbound RPC boundary to the backing content store (spec §6's full
/// operation list). Implementations own the wire protocol; this crate's
/// `workspace::WorkspaceCoordinator` is the only caller.
///
/// Object-safe and `Send + Sync` so it can be shared across the change-feed
/// polling task and client-thread callers alike.
#[async_trait]
pub trait RepositoryService: Send + Sync {
    async fn login(&self, workspace_name: &str) -> Result<SessionInfo>;
    async fn obtain(&self, session: &SessionInfo, switch_workspace: &str) -> Result<SessionInfo>;
    async fn dispose(&self, session: &SessionInfo) -> Result<()>;

    async fn get_repository_descriptors(&self) -> Result<RepositoryDescriptors>;
    async fn get_root_id(&self, session: &SessionInfo) -> Result<NodeId>;
    async fn get_item_info(&self, session: &SessionInfo, id: &ItemId) -> Result<ItemInfo>;
    async fn get_node_info(&self, session: &SessionInfo, id: NodeId) -> Result<NodeInfo>;
    async fn get_child_infos(&self, session: &SessionInfo, parent: NodeId) -> Result<Vec<ChildInfo>>;

    async fn get_node_type_definitions(&self, session: &SessionInfo) -> Result<Vec<NodeTypeDefinition>>;
    async fn get_node_definition(&self, session: &SessionInfo, name: &QName) -> Result<NodeTypeDefinition>;

    async fn get_registered_namespaces(&self, session: &SessionInfo) -> Result<Vec<(String, String)>>;
    async fn register_namespace(&self, session: &SessionInfo, prefix: &str, uri: &str) -> Result<()>;
    async fn unregister_namespace(&self, session: &SessionInfo, prefix: &str) -> Result<()>;

    async fn is_granted(&self, session: &SessionInfo, id: &ItemId, actions: &[String]) -> Result<bool>;

    async fn create_batch(&self, session: &SessionInfo, target: NodeId) -> Result<BatchId>;
    async fn submit(&self, session: &SessionInfo, batch: BatchId, ops: &crate::state::ChangeLog) -> Result<()>;

    async fn add_node(&self, session: &SessionInfo, batch: BatchId, parent: NodeId, name: &QName, primary_type: &QName) -> Result<NodeId>;
    async fn add_property(&self, session: &SessionInfo, batch: BatchId, parent: NodeId, name: &QName, value: &[Value]) -> Result<()>;
    async fn set_value(&self, session: &SessionInfo, batch: BatchId, id: &PropertyId, value: &[Value]) -> Result<()>;
    async fn set_mixins(&self, session: &SessionInfo, batch: BatchId, node: NodeId, mixins: &[QName]) -> Result<()>;
    async fn remove(&self, session: &SessionInfo, batch: BatchId, id: &ItemId) -> Result<()>;
    async fn move_item(&self, session: &SessionInfo, batch: BatchId, source: &Path, destination: &Path) -> Result<()>;
    async fn reorder_nodes(&self, session: &SessionInfo, batch: BatchId, parent: NodeId, ordering: &[NodeId]) -> Result<()>;
    async fn copy(&self, session: &SessionInfo, batch: BatchId, source: &Path, destination: &Path) -> Result<()>;
    async fn clone_item(&self, session: &SessionInfo, batch: BatchId, source_workspace: &str, source: &Path, destination: &Path) -> Result<()>;
    async fn update(&self, session: &SessionInfo, node: NodeId, source_workspace: &str) -> Result<()>;
    async fn import_xml(&self, session: &SessionInfo, parent: NodeId, xml: &[u8]) -> Result<()>;

    async fn checkout(&self, session: &SessionInfo, node: NodeId) -> Result<()>;
    async fn checkin(&self, session: &SessionInfo, node: NodeId) -> Result<String>;
    async fn restore(&self, session: &SessionInfo, node: NodeId, version_label: &str) -> Result<()>;
    async fn merge(&self, session: &SessionInfo, node: NodeId, source_workspace: &str) -> Result<Vec<NodeId>>;
    async fn resolve_merge_conflict(&self, session: &SessionInfo, node: NodeId, accept_source: bool) -> Result<()>;

    async fn lock(&self, session: &SessionInfo, node: NodeId, is_deep: bool, is_session_scoped: bool) -> Result<LockInfo>;
    async fn refresh_lock(&self, session: &SessionInfo, node: NodeId) -> Result<()>;
    async fn unlock(&self, session: &SessionInfo, node: NodeId) -> Result<()>;
    async fn get_lock_info(&self, session: &SessionInfo, node: NodeId) -> Result<Option<LockInfo>>;

    async fn add_version_label(&self, session: &SessionInfo, node: NodeId, label: &str) -> Result<()>;
    async fn remove_version_label(&self, session: &SessionInfo, node: NodeId, label: &str) -> Result<()>;
    async fn remove_version(&self, session: &SessionInfo, node: NodeId, version_label: &str) -> Result<()>;

    async fn create_event_filter(&self, session: &SessionInfo, filter: EventFilter) -> Result<u64>;
    async fn get_events(&self, session: &SessionInfo, poll_timeout_ms: u64, filters: &[u64]) -> Result<EventBundle>;

    async fn execute_query(&self, session: &SessionInfo, statement: &str, language: &str) -> Result<Vec<ItemId>>;
    async fn check_query_statement(&self, session: &SessionInfo, statement: &str, language: &str) -> Result<()>;
    async fn get_supported_query_languages(&self, session: &SessionInfo) -> Result<Vec<String>>;

    async fn get_workspace_names(&self, session: &SessionInfo) -> Result<Vec<String>>;

    /// Whether this backing store advertises the observation capability
    /// (spec §4.5: "if the backing store advertises observation support").
    /// Default implementation reports no support, so the Coordinator does
    /// not spawn a polling worker for services that never override this.
    async fn supports_observation(&self) -> bool {
        false
    }
}
