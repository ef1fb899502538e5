//! Change stream reader: tails one side's feed and classifies each record.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use duplex_store::{ChangeFeed, DocumentStore, StoreError};
use duplex_types::{Change, DocumentId, RawVersion, Revision, SideId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Events emitted while a [`ChangeReader`] is running.
///
/// `Started`/`Stopped` bracket the running period for observers that need
/// lifecycle visibility, e.g. to know when to start issuing writes.
#[derive(Debug, Clone)]
pub enum ReaderEvent {
    /// The reader began tailing the feed.
    Started {
        /// The observed side.
        side: SideId,
    },
    /// A plain update: a single live revision, not a tombstone.
    Read(RawVersion),
    /// A deletion tombstone.
    Deleted {
        /// The deleted document.
        id: DocumentId,
        /// The tombstone revision.
        revision: Revision,
    },
    /// More than one live revision. Carries the store's chosen winner; the
    /// full conflict set must be fetched separately before merging.
    Conflict(RawVersion),
    /// A record could not be read or interpreted. The stream continues
    /// unless the fault was connection-level, in which case `Stopped`
    /// follows.
    Error {
        /// The observed side.
        side: SideId,
        /// Human-readable description.
        message: String,
    },
    /// The reader left the running state.
    Stopped {
        /// The observed side.
        side: SideId,
    },
}

/// A continuously-running, cancellable observer over one side's change
/// feed.
///
/// State machine: `Stopped` → [`ChangeReader::start`] → `Running` →
/// (connection fault | [`ChangeReader::stop`]) → `Stopped`. Stopping
/// cancels the in-flight feed pull; resolver and writer work already
/// triggered by delivered events is left to complete.
pub struct ChangeReader {
    store: Arc<dyn DocumentStore>,
    event_buffer: usize,
    since: u64,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeReader {
    /// Creates a stopped reader over one side.
    pub fn new(store: Arc<dyn DocumentStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            event_buffer: config.event_buffer,
            since: 0,
            shutdown: None,
            task: None,
        }
    }

    /// Starts tailing after the given change sequence instead of 0.
    #[must_use]
    pub fn with_since(mut self, since: u64) -> Self {
        self.since = since;
        self
    }

    /// The observed side.
    pub fn side(&self) -> &SideId {
        self.store.side()
    }

    /// Whether the reader task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Subscribes to the feed and spawns the tail task.
    ///
    /// Returns the event stream; the first event is `Started`, the last
    /// `Stopped`.
    pub async fn start(&mut self) -> EngineResult<mpsc::Receiver<ReaderEvent>> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        let feed = self.store.changes(self.since).await?;
        let (events, receiver) = mpsc::channel(self.event_buffer);
        let (shutdown, shutdown_rx) = watch::channel(false);
        self.task = Some(tokio::spawn(run(
            self.store.clone(),
            feed,
            events,
            shutdown_rx,
        )));
        self.shutdown = Some(shutdown);
        Ok(receiver)
    }

    /// Cancels the subscription and waits for the tail task to finish.
    pub async fn stop(&mut self) -> EngineResult<()> {
        let Some(shutdown) = self.shutdown.take() else {
            return Err(EngineError::NotRunning);
        };
        let _ = shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChangeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeReader")
            .field("side", self.side())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run(
    store: Arc<dyn DocumentStore>,
    mut feed: ChangeFeed,
    events: mpsc::Sender<ReaderEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let side = store.side().clone();
    if events
        .send(ReaderEvent::Started { side: side.clone() })
        .await
        .is_err()
    {
        return;
    }

    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = feed.next() => next,
        };

        let outcome = match next {
            // Feed ended: the subscription is gone.
            None => break,
            Some(Err(e)) => Err(e),
            Some(Ok(change)) => classify(store.as_ref(), change).await,
        };

        match outcome {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) if e.is_connection_fault() => {
                warn!(%side, error = %e, "change feed lost");
                let _ = events
                    .send(ReaderEvent::Error {
                        side: side.clone(),
                        message: e.to_string(),
                    })
                    .await;
                break;
            }
            Err(e) => {
                warn!(%side, error = %e, "skipping unreadable change record");
                if events
                    .send(ReaderEvent::Error {
                        side: side.clone(),
                        message: e.to_string(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    debug!(%side, "change reader stopped");
    let _ = events.send(ReaderEvent::Stopped { side }).await;
}

async fn classify(store: &dyn DocumentStore, change: Change) -> Result<ReaderEvent, StoreError> {
    let Some(winner) = change.winner().cloned() else {
        return Err(StoreError::Malformed(format!(
            "change {} for {} carries no revisions",
            change.seq, change.id
        )));
    };
    if change.deleted {
        return Ok(ReaderEvent::Deleted {
            id: change.id,
            revision: winner,
        });
    }
    let primary = store.fetch(&change.id, &winner).await?;
    if change.is_conflict() {
        Ok(ReaderEvent::Conflict(primary))
    } else {
        Ok(ReaderEvent::Read(primary))
    }
}
