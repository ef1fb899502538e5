//! Abstract versioned document store contract for duplex.
//!
//! The replication engine never talks to a concrete store directly; it
//! consumes this narrow capability set, so the transport and storage engine
//! behind it are replaceable:
//!
//! - optimistic create/update/delete with revision checks
//! - conflict-set enumeration and by-revision fetch
//! - a change feed ordered by the store's native change sequence
//!
//! The [`memory`] module provides a complete in-process implementation used
//! by tests and by anyone who wants two sides in one process.

mod error;
mod feed;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use feed::{ChangeFeed, FEED_BUFFER};

use async_trait::async_trait;
use duplex_types::{DocumentId, RawVersion, Revision, SideId};

/// One independently-writable versioned document store ("side").
///
/// Revision semantics: every successful write advances a document's
/// revision chain by exactly one; stores never rewrite history. A
/// successful [`DocumentStore::update`] against the current winning
/// revision of a conflicted document collapses the whole conflict set to
/// the single new revision.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The side this store instance represents.
    fn side(&self) -> &SideId;

    /// Persists a brand-new document and returns its first revision.
    ///
    /// Fails with [`StoreError::Conflict`] when a live document with the
    /// same identifier already exists — an expected outcome under
    /// concurrent creation, not a fault.
    async fn create(&self, version: &RawVersion) -> StoreResult<Revision>;

    /// Optimistically replaces the document state at `expected`.
    ///
    /// Fails with [`StoreError::Conflict`] when the document's current
    /// winning revision differs from `expected`.
    async fn update(&self, version: &RawVersion, expected: &Revision) -> StoreResult<Revision>;

    /// Writes a deletion tombstone at `expected`, with the same optimistic
    /// check as [`DocumentStore::update`]. The tombstone is delivered
    /// through the change feed like any other change.
    async fn delete(&self, id: &DocumentId, expected: &Revision) -> StoreResult<Revision>;

    /// The current winning version, or `None` for absent/deleted documents.
    async fn current(&self, id: &DocumentId) -> StoreResult<Option<RawVersion>>;

    /// Every revision the store currently considers live for the document,
    /// winner first. A singleton means no conflict; empty means deleted.
    async fn conflict_revisions(&self, id: &DocumentId) -> StoreResult<Vec<Revision>>;

    /// Fetches one historical version by revision.
    async fn fetch(&self, id: &DocumentId, revision: &Revision) -> StoreResult<RawVersion>;

    /// Subscribes to the change feed, starting after sequence `since`
    /// (pass 0 for everything). Changes arrive in the store's native
    /// change-sequence order.
    async fn changes(&self, since: u64) -> StoreResult<ChangeFeed>;
}
