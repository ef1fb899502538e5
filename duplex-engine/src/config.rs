//! Engine configuration.

use duplex_types::SideId;

/// Tuning knobs shared by writers, readers and resolvers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Store attempts per optimistic update before giving up with
    /// `ConcurrentModification`. A document changing faster than the
    /// merge-and-retry cycle must eventually be surfaced to the caller,
    /// not retried forever.
    pub max_update_attempts: u32,
    /// Buffered events per reader/replicator channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: 4,
            event_buffer: 64,
        }
    }
}

/// Configuration of one replicated pair of sides.
///
/// Plain data: store connection parameters belong to the concrete
/// [`duplex_store::DocumentStore`] constructors, and the merge algorithm
/// set lives in the [`duplex_merge::MergeRegistry`].
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Name of the first side.
    pub side_a: SideId,
    /// Name of the second side.
    pub side_b: SideId,
    /// Engine knobs applied to both directions.
    pub engine: EngineConfig,
}

impl ReplicationConfig {
    /// Pairs two sides with default engine knobs.
    pub fn new(side_a: impl Into<SideId>, side_b: impl Into<SideId>) -> Self {
        Self {
            side_a: side_a.into(),
            side_b: side_b.into(),
            engine: EngineConfig::default(),
        }
    }
}
