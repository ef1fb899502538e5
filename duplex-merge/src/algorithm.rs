//! Merge algorithm contracts: strongly typed and type erased.
//!
//! Replication code that processes heterogeneous streams only knows the
//! entity kind at runtime, so the registry stores [`ErasedMerge`] trait
//! objects. Strong typing is recovered at registration time: [`erase`]
//! wraps a typed [`MergeAlgorithm`] in an adapter that unpacks envelopes,
//! runs the typed merge, and packs the result back. No runtime reflection
//! is involved.

use crate::entity::{unpack, Replicated};
use crate::error::MergeResult;
use duplex_types::{HybridTimestamp, RawDocument, RawVersion, Version};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A per-entity-kind merge algorithm.
///
/// Must be a pure, deterministic function of its inputs: given the same
/// primary version and conflict set, every side computes the same payload.
/// Execution is synchronous and CPU-only.
pub trait MergeAlgorithm<E>: Send + Sync {
    /// Reduces the primary version and its conflict set to one payload.
    fn merge(&self, primary: &Version<E>, conflicts: &[Version<E>]) -> E;
}

impl<E, F> MergeAlgorithm<E> for F
where
    F: Fn(&Version<E>, &[Version<E>]) -> E + Send + Sync,
{
    fn merge(&self, primary: &Version<E>, conflicts: &[Version<E>]) -> E {
        self(primary, conflicts)
    }
}

/// Envelope-level merge, used where the entity type is only known at
/// runtime.
pub trait ErasedMerge: Send + Sync + fmt::Debug {
    /// Reduces the primary envelope version and its conflict set to one
    /// merged envelope payload.
    fn merge(&self, primary: &RawVersion, conflicts: &[RawVersion]) -> MergeResult<RawDocument>;
}

/// Typed adapter generated at registration time.
struct Typed<E, A> {
    algorithm: A,
    _entity: PhantomData<fn() -> E>,
}

impl<E, A> fmt::Debug for Typed<E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed").finish_non_exhaustive()
    }
}

impl<E, A> ErasedMerge for Typed<E, A>
where
    E: Replicated,
    A: MergeAlgorithm<E>,
{
    fn merge(&self, primary: &RawVersion, conflicts: &[RawVersion]) -> MergeResult<RawDocument> {
        let primary = unpack::<E>(primary)?;
        let conflicts = conflicts
            .iter()
            .map(unpack::<E>)
            .collect::<MergeResult<Vec<_>>>()?;
        let merged = self.algorithm.merge(&primary, &conflicts);
        merged.to_raw()
    }
}

/// Wraps a typed algorithm into its envelope-level form.
pub fn erase<E: Replicated>(algorithm: impl MergeAlgorithm<E> + 'static) -> Arc<dyn ErasedMerge> {
    Arc::new(Typed {
        algorithm,
        _entity: PhantomData,
    })
}

/// Stamp for a merge result: the newest timestamp among the inputs.
///
/// Deterministic on purpose — no clock consult. Merging the same set on
/// two sides yields the same stamp, and a merge result compares against
/// any other version exactly like its winning input did, so repeated
/// merges converge instead of leapfrogging each other.
pub fn merged_timestamp(primary: &RawVersion, conflicts: &[RawVersion]) -> HybridTimestamp {
    conflicts
        .iter()
        .fold(primary.modified, |ts, c| ts.max(c.modified))
}
