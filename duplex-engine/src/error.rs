//! Error types for the engine.

use duplex_merge::MergeError;
use duplex_store::StoreError;
use duplex_types::DocumentId;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// Expected races — create-already-exists and in-budget update conflicts —
/// are handled inside the writer and never appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The update retry budget ran out under sustained contention. The
    /// document stays unresolved until its next change notification.
    #[error("concurrent modification of {id}: gave up after {attempts} attempts")]
    ConcurrentModification {
        /// The contended document.
        id: DocumentId,
        /// How many store attempts were made.
        attempts: u32,
    },

    /// Merge or registry failure (missing algorithm, payload decode).
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Store failure that was not an expected race.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid wiring, reported synchronously at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// `start` called on a running reader or replicator.
    #[error("already running")]
    AlreadyRunning,

    /// `stop` called without a prior `start`.
    #[error("not running")]
    NotRunning,
}
