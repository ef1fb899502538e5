//! Conflict resolver: merges a conflict set down to one version and writes
//! it back.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::writer::Writer;
use duplex_merge::MergeRegistry;
use duplex_store::DocumentStore;
use duplex_types::{RawVersion, Revision, SideId, Version};
use std::sync::Arc;
use tracing::{debug, info};

/// Settles conflicts observed on one side.
///
/// Wires a conflict notification to the merge registry and the writer:
/// fetch the full conflict set, merge, write the result back against the
/// primary revision. The write-back collapses the conflict set to one
/// revision, so the same side's reader observes it as a plain read and no
/// resolution loop forms.
pub struct Resolver {
    store: Arc<dyn DocumentStore>,
    registry: Arc<MergeRegistry>,
    writer: Writer,
}

impl Resolver {
    /// Creates a resolver for one side.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<MergeRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let writer = Writer::new(store.clone(), config);
        Self {
            store,
            registry,
            writer,
        }
    }

    /// The resolving side.
    pub fn side(&self) -> &SideId {
        self.store.side()
    }

    /// Resolves one conflict occurrence.
    ///
    /// `primary` is the store's chosen winner as delivered by the change
    /// feed. Returns the written resolved version. If another writer races
    /// the write-back, the writer's bounded retry re-merges against the
    /// newer conflict set; an exhausted budget surfaces as
    /// [`EngineError::ConcurrentModification`] and a future change
    /// notification for the document retriggers resolution.
    pub async fn resolve(&self, primary: RawVersion) -> EngineResult<RawVersion> {
        let id = primary.entity.id.clone();
        if primary.is_new() {
            return Err(EngineError::Config(format!(
                "conflict primary for {id} carries no revision"
            )));
        }

        let conflicts: Vec<RawVersion> = self
            .writer
            .live_versions(&id)
            .await?
            .into_iter()
            .filter(|version| version.revision != primary.revision)
            .collect();

        if conflicts.is_empty() {
            debug!(%id, side = %self.side(), "conflict already collapsed, nothing to resolve");
            return Ok(primary);
        }

        let merged = self.registry.merge(&primary, &conflicts)?;
        let algorithm = self.registry.resolve(&primary.entity.kind)?;
        let expected = primary.revision.clone();
        let intended = Version {
            entity: merged.entity,
            revision: Revision::none(),
            side: self.side().clone(),
            modified: merged.modified,
        };

        let resolved = self
            .writer
            .update_raw(intended, &expected, algorithm.as_ref())
            .await?;
        info!(
            %id,
            side = %self.side(),
            revision = %resolved.revision,
            conflicts = conflicts.len(),
            "conflict resolved"
        );
        Ok(resolved)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("side", self.side()).finish()
    }
}
