//! The `Version` snapshot model and the type-erased document envelope.
//!
//! A version is an immutable snapshot of one document state: the payload,
//! the store-assigned revision (empty until persisted), the side that
//! produced it, and its modification timestamp. No component mutates a
//! version in place; superseding a version means writing a new one.

use crate::{DocumentId, HybridTimestamp, Revision, SideId};
use serde::{Deserialize, Serialize};

/// One snapshot of a document's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version<T> {
    /// The payload.
    pub entity: T,
    /// Store-assigned revision; empty until the version is persisted.
    pub revision: Revision,
    /// The side that produced this version.
    pub side: SideId,
    /// Modification timestamp assigned by the producing side.
    pub modified: HybridTimestamp,
}

impl<T> Version<T> {
    /// Creates a fresh, not-yet-persisted version.
    pub fn new(entity: T, side: SideId, modified: HybridTimestamp) -> Self {
        Self {
            entity,
            revision: Revision::none(),
            side,
            modified,
        }
    }

    /// True while the version has not been persisted (empty revision).
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.revision.is_empty()
    }

    /// Returns the same snapshot stamped with a store-assigned revision.
    #[must_use]
    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    /// Maps the payload, keeping revision, side and timestamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Version<U> {
        Version {
            entity: f(self.entity),
            revision: self.revision,
            side: self.side,
            modified: self.modified,
        }
    }
}

/// Type-erased store representation of an entity.
///
/// Generic replication code moves documents between sides without knowing
/// their concrete types; the envelope carries the identifier, the entity
/// kind used to look up a merge algorithm, and the serialized payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Stable document identifier.
    pub id: DocumentId,
    /// Entity kind, e.g. `"note"`. Keyed on by the merge registry.
    pub kind: String,
    /// Serialized payload.
    pub body: serde_json::Value,
}

impl RawDocument {
    /// Creates an envelope.
    pub fn new(id: DocumentId, kind: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            id,
            kind: kind.into(),
            body,
        }
    }
}

/// A version of a type-erased document.
pub type RawVersion = Version<RawDocument>;
