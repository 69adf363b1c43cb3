//! Crate-wide error taxonomy.
//!
//! Mirrors the teacher's flat, `thiserror`-backed `Error` enum rather than a
//! narrow exception class per component: every component in this crate
//! (state layer, hierarchy cache, node-type registry, workspace coordinator)
//! returns `crate::Result<T>` using the variants below. Lookup failures that
//! the propagation policy says should collapse to `false`/`None` (e.g.
//! `item_exists`, `has_node`) are handled by the caller matching on
//! `Error::ItemNotFound`/`Error::PathNotFound`, not by inventing a second
//! error type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The complete error taxonomy of the content engine (spec §7).
#[derive(Debug, Error, Clone)]
pub enum Error {
    // ---- ValidationError ----
    /// A mutation would violate a node-type constraint.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Merging two effective node types produced incompatible requirements.
    #[error("node type conflict: {0}")]
    NodeTypeConflict(String),

    /// A path string was not canonical, or was otherwise malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A name did not parse as a valid qualified/prefixed name.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A property value did not satisfy its definition's type or constraints.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    // ---- LookupError ----
    /// No item exists at the given path.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// No item exists with the given id.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// The named workspace does not exist.
    #[error("no such workspace: {0}")]
    NoSuchWorkspace(String),

    /// The named node type is not registered.
    #[error("no such node type: {0}")]
    NoSuchNodeType(String),

    /// A namespace prefix has no registered mapping.
    #[error("unknown namespace prefix: {0}")]
    UnknownPrefix(String),

    /// A namespace URI/prefix registration was invalid.
    #[error("namespace error: {0}")]
    NamespaceError(String),

    // ---- StateError ----
    /// The item state observed is stale relative to the persistent mirror.
    #[error("stale item state: {0}")]
    Stale(String),

    /// An operation was attempted against an item state in an invalid status.
    #[error("invalid item state: {0}")]
    InvalidItemState(String),

    /// An item already exists where a new one was about to be created.
    #[error("item already exists: {0}")]
    ItemExists(String),

    /// A version operation (checkin/checkout/restore) conflicted.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// A merge operation could not be completed automatically.
    #[error("merge error: {0}")]
    Merge(String),

    // ---- AuthorizationError ----
    /// The access manager denied the requested action.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A lock applies to the target and the session does not hold its token.
    #[error("locked: {0}")]
    Locked(String),

    // ---- CapabilityError ----
    /// The requested option/operation is not supported by this configuration.
    #[error("not supported: {0}")]
    NotSupportedOption(String),

    /// `checkForReferencesInContent`/`checkForConflictingContent` hooks are
    /// not implemented by this configuration (spec §9 open question).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    // ---- TransportError ----
    /// The backing Repository Service reported a failure.
    #[error("repository error: {0}")]
    RepositoryError(String),

    // ---- Ambient (config/IO) ----
    /// Configuration file or value was invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Filesystem/IO failure while loading configuration.
    #[error("io error: {0}")]
    IoError(String),

    /// A config file failed to parse.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Catch-all for conditions that don't fit the taxonomy above.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// True for the subset of variants the propagation policy silently
    /// folds into `false`/`None` in `item_exists`, `has_node`, `has_property`.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound(_) | Self::ItemNotFound(_) | Self::NoSuchNodeType(_)
        )
    }

    /// True for errors that abort the enclosing batch but must not mutate
    /// transient state (transport-layer failures).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::RepositoryError(_))
    }
}
