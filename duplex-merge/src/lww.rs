//! Last-writer-wins merge algorithms.
//!
//! Concurrent versions are ordered by their `modified` timestamp; equal
//! timestamps break the tie on the producing side's name, which is
//! arbitrary but deterministic — both sides pick the same winner.
//!
//! Use cases:
//! - [`LwwDocument`]: whole-document wins, the simplest useful policy
//! - [`LwwFields`]: per-top-level-field wins, finer granularity for
//!   documents whose fields are edited independently

use crate::algorithm::{ErasedMerge, MergeAlgorithm};
use crate::error::MergeResult;
use duplex_types::{RawDocument, RawVersion, Version};

fn wins<T>(candidate: &Version<T>, incumbent: &Version<T>) -> bool {
    (candidate.modified, candidate.side.as_str()) > (incumbent.modified, incumbent.side.as_str())
}

/// Whole-document last-writer-wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LwwDocument;

impl<E: Clone> MergeAlgorithm<E> for LwwDocument {
    fn merge(&self, primary: &Version<E>, conflicts: &[Version<E>]) -> E {
        let mut winner = primary;
        for candidate in conflicts {
            if wins(candidate, winner) {
                winner = candidate;
            }
        }
        winner.entity.clone()
    }
}

/// Per-top-level-field last-writer-wins over the envelope.
///
/// Overlays the conflicting bodies oldest-to-newest, so every field ends up
/// with the value from the newest version that set it, and fields set on
/// only one side survive the merge. Falls back to whole-document wins when
/// any body is not a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct LwwFields;

impl ErasedMerge for LwwFields {
    fn merge(&self, primary: &RawVersion, conflicts: &[RawVersion]) -> MergeResult<RawDocument> {
        let mut versions: Vec<&RawVersion> = std::iter::once(primary).chain(conflicts).collect();
        versions.sort_by(|a, b| {
            (a.modified, a.side.as_str()).cmp(&(b.modified, b.side.as_str()))
        });

        if versions.iter().any(|v| !v.entity.body.is_object()) {
            let newest = versions[versions.len() - 1];
            return Ok(newest.entity.clone());
        }

        let mut body = serde_json::Map::new();
        for version in &versions {
            if let Some(fields) = version.entity.body.as_object() {
                for (key, value) in fields {
                    body.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(RawDocument::new(
            primary.entity.id.clone(),
            primary.entity.kind.clone(),
            serde_json::Value::Object(body),
        ))
    }
}
