//! Error types for the merge layer.

use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur in merge and registry operations.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Registration or build attempted after the registry was frozen.
    #[error("merge registry is already built")]
    AlreadyBuilt,

    /// Lookup attempted before the registry was frozen.
    #[error("merge registry is not built yet")]
    NotBuilt,

    /// No algorithm registered for the entity kind.
    #[error("no merge algorithm registered for kind {0:?}")]
    NotFound(String),

    /// Two algorithms registered for the same entity kind.
    #[error("merge algorithm for kind {0:?} registered twice")]
    Duplicate(String),

    /// An envelope carried a different kind than the one expected.
    #[error("document kind mismatch: expected {expected:?}, got {actual:?}")]
    KindMismatch {
        /// The kind the caller asked for.
        expected: String,
        /// The kind found in the envelope.
        actual: String,
    },

    /// Payload (de)serialization failed.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
