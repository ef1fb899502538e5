//! Per-side document writer with optimistic conflict handling.
//!
//! Creation races and update conflicts are expected outcomes of
//! multi-master writing, not faults. `try_create` reports an existing
//! document as a normal result; `update` re-merges against the live
//! conflict set and retries, within a bounded budget, before surfacing
//! `ConcurrentModification`.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use duplex_merge::{erase, merged_timestamp, pack, unpack, ErasedMerge, MergeAlgorithm, Replicated};
use duplex_store::{DocumentStore, StoreError};
use duplex_types::{DocumentId, HybridTimestamp, RawVersion, Revision, SideId, Version};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of an attempted create.
///
/// Two sides creating the same identifier concurrently is a normal race:
/// exactly one side gets `Created`, the other `AlreadyExists` and switches
/// to the update/merge flow.
#[derive(Debug)]
pub enum CreateOutcome<E> {
    /// The document was persisted; the version carries its first revision.
    Created(Version<E>),
    /// A live document with the same identifier already exists.
    AlreadyExists,
}

impl<E> CreateOutcome<E> {
    /// True for the `Created` arm.
    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// Unwraps the created version, if any.
    pub fn created(self) -> Option<Version<E>> {
        match self {
            Self::Created(version) => Some(version),
            Self::AlreadyExists => None,
        }
    }
}

/// Writes documents to one side.
#[derive(Clone)]
pub struct Writer {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
}

impl Writer {
    /// Creates a writer for one side.
    pub fn new(store: Arc<dyn DocumentStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            max_attempts: config.max_update_attempts.max(1),
        }
    }

    /// The side this writer targets.
    pub fn side(&self) -> &SideId {
        self.store.side()
    }

    /// Attempts to persist a brand-new document.
    pub async fn try_create<E: Replicated>(
        &self,
        entity: E,
        modified: HybridTimestamp,
    ) -> EngineResult<CreateOutcome<E>> {
        let version = Version::new(entity, self.side().clone(), modified);
        let raw = pack(&version)?;
        match self.store.create(&raw).await {
            Ok(revision) => {
                debug!(id = %raw.entity.id, %revision, side = %self.side(), "document created");
                Ok(CreateOutcome::Created(version.with_revision(revision)))
            }
            Err(StoreError::Conflict) => {
                debug!(id = %raw.entity.id, side = %self.side(), "create race: document already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Optimistically updates a document, merging and retrying on conflict.
    pub async fn update<E: Replicated>(
        &self,
        entity: E,
        expected: &Revision,
        modified: HybridTimestamp,
        algorithm: impl MergeAlgorithm<E> + 'static,
    ) -> EngineResult<Version<E>> {
        let version = Version::new(entity, self.side().clone(), modified);
        let raw = pack(&version)?;
        let merge = erase(algorithm);
        let written = self.update_raw(raw, expected, merge.as_ref()).await?;
        Ok(unpack::<E>(&written)?)
    }

    /// Envelope-level update used by the resolver and the replicator.
    ///
    /// Each lost race fetches the live conflict set, merges the intended
    /// version against it, and re-attempts against the new winner. After
    /// `max_update_attempts` store attempts the conflict is surfaced as
    /// [`EngineError::ConcurrentModification`].
    pub async fn update_raw(
        &self,
        version: RawVersion,
        expected: &Revision,
        merge: &dyn ErasedMerge,
    ) -> EngineResult<RawVersion> {
        let id = version.entity.id.clone();
        let mut intended = version;
        let mut expected = expected.clone();

        for attempt in 1..=self.max_attempts {
            match self.store.update(&intended, &expected).await {
                Ok(revision) => return Ok(intended.with_revision(revision)),
                Err(StoreError::Conflict) if attempt < self.max_attempts => {
                    debug!(%id, attempt, side = %self.side(), "update lost the race, re-merging");
                    let conflicts = self.live_versions(&id).await?;
                    let Some(winner) = conflicts.first() else {
                        // The document disappeared mid-retry.
                        return Err(StoreError::NotFound(id.to_string()).into());
                    };
                    expected = winner.revision.clone();
                    let modified = merged_timestamp(&intended, &conflicts);
                    let entity = merge.merge(&intended, &conflicts)?;
                    intended = Version {
                        entity,
                        revision: Revision::none(),
                        side: intended.side,
                        modified,
                    };
                }
                Err(StoreError::Conflict) => {
                    warn!(%id, attempts = self.max_attempts, side = %self.side(), "update retry budget exhausted");
                    return Err(EngineError::ConcurrentModification {
                        id,
                        attempts: self.max_attempts,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::ConcurrentModification {
            id,
            attempts: self.max_attempts,
        })
    }

    /// Fetches every live version of a document, winner first.
    pub(crate) async fn live_versions(&self, id: &DocumentId) -> EngineResult<Vec<RawVersion>> {
        let revisions = self.store.conflict_revisions(id).await?;
        let mut versions = Vec::with_capacity(revisions.len());
        for revision in &revisions {
            versions.push(self.store.fetch(id, revision).await?);
        }
        Ok(versions)
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("side", self.side())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
