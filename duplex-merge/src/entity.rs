//! The `Replicated` entity capability.

use crate::error::{MergeError, MergeResult};
use duplex_types::{DocumentId, RawDocument, RawVersion, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An entity the engine can replicate.
///
/// The single required capability is conversion to and from the store
/// envelope; business fields stay opaque to the engine. `KIND` must be
/// stable and unique per entity type — it is the merge registry key and is
/// persisted inside every envelope.
pub trait Replicated: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable entity kind, e.g. `"note"`.
    const KIND: &'static str;

    /// The entity's stable document identifier.
    fn id(&self) -> DocumentId;

    /// Serializes the entity into a store envelope.
    fn to_raw(&self) -> MergeResult<RawDocument> {
        Ok(RawDocument::new(
            self.id(),
            Self::KIND,
            serde_json::to_value(self)?,
        ))
    }

    /// Deserializes an entity out of a store envelope.
    fn from_raw(raw: &RawDocument) -> MergeResult<Self> {
        if raw.kind != Self::KIND {
            return Err(MergeError::KindMismatch {
                expected: Self::KIND.to_string(),
                actual: raw.kind.clone(),
            });
        }
        Ok(serde_json::from_value(raw.body.clone())?)
    }
}

/// Converts a typed version into its envelope form, keeping revision, side
/// and timestamp.
pub fn pack<E: Replicated>(version: &Version<E>) -> MergeResult<RawVersion> {
    Ok(Version {
        entity: version.entity.to_raw()?,
        revision: version.revision.clone(),
        side: version.side.clone(),
        modified: version.modified,
    })
}

/// Converts an envelope version back into its typed form.
pub fn unpack<E: Replicated>(version: &RawVersion) -> MergeResult<Version<E>> {
    Ok(Version {
        entity: E::from_raw(&version.entity)?,
        revision: version.revision.clone(),
        side: version.side.clone(),
        modified: version.modified,
    })
}
