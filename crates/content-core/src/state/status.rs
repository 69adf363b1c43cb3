//! The item state status automaton (spec §3).

use crate::{Error, Result};

/// The lifecycle status of an [`super::ItemState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Created transiently, never saved.
    New,
    /// Mirrors a persistent state with no pending local changes.
    Existing,
    /// Mirrors a persistent state with pending local changes.
    ExistingModified,
    /// Marked for removal in this session, not yet saved.
    ExistingRemoved,
    /// `ExistingModified` whose persistent counterpart changed externally.
    StaleModified,
    /// `Existing`/`ExistingModified` whose persistent counterpart was
    /// destroyed externally.
    StaleDestroyed,
    /// Terminal: no longer part of the item graph.
    Removed,
}

/// Events that drive the status automaton (spec §3 transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    CreateTransient,
    Save,
    RemoveTransient,
    MutateInSession,
    RefreshDiscard,
    ExternalDelete,
    ExternalModify,
    RemoveInSession,
}

impl Status {
    /// Apply `event`, returning the resulting status or
    /// [`Error::InvalidItemState`] if the transition is not in the table.
    pub fn apply(self, event: Event) -> Result<Self> {
        use Event::{
            CreateTransient, ExternalDelete, ExternalModify, MutateInSession, RefreshDiscard,
            RemoveInSession, RemoveTransient, Save,
        };
        use Status::{
            Existing, ExistingModified, ExistingRemoved, New, Removed, StaleDestroyed,
            StaleModified,
        };

        let next = match (self, event) {
            (New, Save) => Existing,
            (New, RemoveTransient) => Removed,
            (Existing, MutateInSession) => ExistingModified,
            (ExistingModified, Save) => Existing,
            (ExistingModified, RefreshDiscard) => Existing,
            (Existing | ExistingModified, ExternalDelete) => StaleDestroyed,
            (ExistingModified, ExternalModify) => StaleModified,
            (Existing, RemoveInSession) => ExistingRemoved,
            (ExistingRemoved, Save) => Removed,
            _ => {
                return Err(Error::InvalidItemState(format!(
                    "no transition for event {event:?} from status {self:?}"
                )))
            }
        };
        let _ = CreateTransient; // only valid as the initial allocation, handled by the caller
        Ok(next)
    }

    /// Whether this status represents a transient (unsaved) state.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::New | Self::ExistingModified | Self::ExistingRemoved
        )
    }

    /// Whether `undo` is meaningful for this status (spec §4.1 `undo`).
    #[must_use]
    pub const fn is_undoable(self) -> bool {
        matches!(self, Self::New | Self::ExistingModified | Self::ExistingRemoved)
    }

    /// Whether the item is enumerable through normal (non-zombie) traversal.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Removed | Self::ExistingRemoved | Self::StaleDestroyed)
    }
}
