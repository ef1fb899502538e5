//! Change feed subscription handle.

use crate::error::StoreResult;
use duplex_types::Change;
use tokio::sync::mpsc;

/// Buffered changes per subscription before backpressure applies.
pub const FEED_BUFFER: usize = 64;

/// A live subscription to one side's change feed.
///
/// Store implementations push ordered [`Change`] records (or a terminal
/// error) into the channel; consumers pull with [`ChangeFeed::next`].
/// Dropping the feed cancels the subscription.
pub struct ChangeFeed {
    changes: mpsc::Receiver<StoreResult<Change>>,
}

impl ChangeFeed {
    /// Wraps a subscription channel produced by a store implementation.
    #[must_use]
    pub fn new(changes: mpsc::Receiver<StoreResult<Change>>) -> Self {
        Self { changes }
    }

    /// The next change, an error, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<StoreResult<Change>> {
        self.changes.recv().await
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed").finish_non_exhaustive()
    }
}
