//! The build-once merge registry.

use crate::algorithm::{erase, merged_timestamp, ErasedMerge, MergeAlgorithm};
use crate::entity::Replicated;
use crate::error::{MergeError, MergeResult};
use duplex_types::{RawVersion, Version};
use std::collections::HashMap;
use std::sync::Arc;

/// Map from entity kind to merge algorithm.
///
/// Registration happens strictly before any conflict resolution: callers
/// register one algorithm per entity kind, then freeze the registry with
/// [`MergeRegistry::build`]. After that the map is read-only, so concurrent
/// lookups from resolvers and writers need no locking — share it behind an
/// `Arc`.
///
/// Registering after `build`, building twice, or resolving before `build`
/// are programmer errors, reported synchronously.
#[derive(Default)]
pub struct MergeRegistry {
    algorithms: HashMap<String, Arc<dyn ErasedMerge>>,
    built: bool,
}

impl MergeRegistry {
    /// Creates an empty, unfrozen registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed algorithm for `E::KIND`.
    pub fn register<E: Replicated>(
        &mut self,
        algorithm: impl MergeAlgorithm<E> + 'static,
    ) -> MergeResult<()> {
        self.register_erased(E::KIND, erase(algorithm))
    }

    /// Registers an envelope-level algorithm under an explicit kind.
    pub fn register_erased(
        &mut self,
        kind: impl Into<String>,
        algorithm: Arc<dyn ErasedMerge>,
    ) -> MergeResult<()> {
        if self.built {
            return Err(MergeError::AlreadyBuilt);
        }
        let kind = kind.into();
        if self.algorithms.contains_key(&kind) {
            return Err(MergeError::Duplicate(kind));
        }
        self.algorithms.insert(kind, algorithm);
        Ok(())
    }

    /// Freezes the registry. Fails on a second call.
    pub fn build(&mut self) -> MergeResult<()> {
        if self.built {
            return Err(MergeError::AlreadyBuilt);
        }
        self.built = true;
        Ok(())
    }

    /// Whether [`MergeRegistry::build`] has run.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Looks up the algorithm for an entity kind.
    pub fn resolve(&self, kind: &str) -> MergeResult<Arc<dyn ErasedMerge>> {
        if !self.built {
            return Err(MergeError::NotBuilt);
        }
        self.algorithms
            .get(kind)
            .cloned()
            .ok_or_else(|| MergeError::NotFound(kind.to_string()))
    }

    /// Type-erased merge entry point.
    ///
    /// Dispatches on the primary version's entity kind and produces a single
    /// resolved version: the merged payload, the primary's revision carried
    /// forward as the basis of the write-back, the primary's side, and a
    /// `modified` stamp refreshed to the newest input.
    pub fn merge(&self, primary: &RawVersion, conflicts: &[RawVersion]) -> MergeResult<RawVersion> {
        let algorithm = self.resolve(&primary.entity.kind)?;
        let entity = algorithm.merge(primary, conflicts)?;
        Ok(Version {
            entity,
            revision: primary.revision.clone(),
            side: primary.side.clone(),
            modified: merged_timestamp(primary, conflicts),
        })
    }
}

impl std::fmt::Debug for MergeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.algorithms.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("MergeRegistry")
            .field("kinds", &kinds)
            .field("built", &self.built)
            .finish()
    }
}
