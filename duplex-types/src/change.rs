//! Change-feed records.

use crate::{DocumentId, Revision};
use serde::{Deserialize, Serialize};

/// One record from a side's change feed.
///
/// Records are delivered in the store's native change-sequence order.
/// `revisions` holds every revision the store currently considers live for
/// the document, the store's chosen winner first; more than one means the
/// document is in conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Position in the store's change sequence.
    pub seq: u64,
    /// The affected document.
    pub id: DocumentId,
    /// Live revisions, winner first.
    pub revisions: Vec<Revision>,
    /// True when the change is a deletion tombstone.
    pub deleted: bool,
}

impl Change {
    /// The store's chosen winner among the live revisions, if any.
    #[must_use]
    pub fn winner(&self) -> Option<&Revision> {
        self.revisions.first()
    }

    /// True when more than one revision is simultaneously live.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.revisions.len() > 1
    }
}
