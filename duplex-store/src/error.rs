//! Error types for the store contract.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// `Conflict` is the expected-race signal driving the engine's retry and
/// merge logic; everything else is a genuine fault.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document already exists (create) or its current revision differs
    /// from the expected one (update/delete).
    #[error("revision conflict")]
    Conflict,

    /// No such document or revision.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store is unreachable or the connection dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// A record could not be interpreted.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store was shut down.
    #[error("store closed")]
    Closed,
}

impl StoreError {
    /// True for connection-level faults that end a change feed.
    #[must_use]
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Closed)
    }
}
