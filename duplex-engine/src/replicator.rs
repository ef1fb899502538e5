//! Replication driver: pumps changes between a configured pair of sides.

use crate::config::ReplicationConfig;
use crate::error::{EngineError, EngineResult};
use crate::reader::{ChangeReader, ReaderEvent};
use crate::resolver::Resolver;
use crate::writer::Writer;
use duplex_merge::{merged_timestamp, ErasedMerge, MergeRegistry};
use duplex_store::{DocumentStore, StoreError};
use duplex_types::{DocumentId, RawVersion, Revision, SideId, Version};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Progress and failure notifications from a running [`Replicator`].
#[derive(Debug, Clone)]
pub enum ReplicatorEvent {
    /// A change was applied to the destination side.
    Propagated {
        /// The propagated document.
        id: DocumentId,
        /// Side the change was observed on.
        from: SideId,
        /// Side the change was written to.
        to: SideId,
        /// Revision assigned by the destination.
        revision: Revision,
    },
    /// A conflict set was merged down to one revision.
    Resolved {
        /// The resolved document.
        id: DocumentId,
        /// Side the conflict lived on.
        side: SideId,
        /// Revision of the resolved version.
        revision: Revision,
    },
    /// Resolution gave up on this occurrence; the next change notification
    /// for the document will retrigger it.
    ResolveFailed {
        /// The still-conflicted document.
        id: DocumentId,
        /// Side the conflict lives on.
        side: SideId,
        /// Why resolution failed.
        reason: String,
    },
    /// Propagation of one change failed.
    PropagateFailed {
        /// The affected document.
        id: DocumentId,
        /// Side the change was observed on.
        from: SideId,
        /// Side the write failed on.
        to: SideId,
        /// Why propagation failed.
        reason: String,
    },
    /// A source reader left the running state (stop or connection fault).
    /// The owning process decides whether to restart.
    ReaderStopped {
        /// The side whose reader stopped.
        side: SideId,
    },
}

/// Bidirectional replication driver for one pair of sides.
///
/// [`Replicator::start`] spawns one pump per direction; each pump owns the
/// source side's [`ChangeReader`] events, the destination side's
/// [`Writer`], and the source side's [`Resolver`], so conflicts arising
/// from propagation are settled the same way as organic ones.
pub struct Replicator {
    config: ReplicationConfig,
    side_a: Arc<dyn DocumentStore>,
    side_b: Arc<dyn DocumentStore>,
    registry: Arc<MergeRegistry>,
    readers: Option<(ChangeReader, ChangeReader)>,
    pumps: Vec<JoinHandle<()>>,
}

impl Replicator {
    /// Wires a pair of sides to a frozen merge registry.
    pub fn new(
        config: ReplicationConfig,
        side_a: Arc<dyn DocumentStore>,
        side_b: Arc<dyn DocumentStore>,
        registry: Arc<MergeRegistry>,
    ) -> EngineResult<Self> {
        if !registry.is_built() {
            return Err(EngineError::Config(
                "merge registry must be built before replication".to_string(),
            ));
        }
        if config.side_a == config.side_b {
            return Err(EngineError::Config(format!(
                "a side cannot replicate with itself: {}",
                config.side_a
            )));
        }
        if side_a.side() != &config.side_a {
            return Err(EngineError::Config(format!(
                "first store is side {}, config names {}",
                side_a.side(),
                config.side_a
            )));
        }
        if side_b.side() != &config.side_b {
            return Err(EngineError::Config(format!(
                "second store is side {}, config names {}",
                side_b.side(),
                config.side_b
            )));
        }
        Ok(Self {
            config,
            side_a,
            side_b,
            registry,
            readers: None,
            pumps: Vec::new(),
        })
    }

    /// Whether the driver has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.readers.is_some()
    }

    /// Starts both readers and pumps; returns the driver event stream.
    pub async fn start(&mut self) -> EngineResult<mpsc::Receiver<ReplicatorEvent>> {
        if self.readers.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (events, receiver) = mpsc::channel(self.config.engine.event_buffer);

        let mut reader_a = ChangeReader::new(self.side_a.clone(), &self.config.engine);
        let incoming_a = reader_a.start().await?;
        let mut reader_b = ChangeReader::new(self.side_b.clone(), &self.config.engine);
        let incoming_b = match reader_b.start().await {
            Ok(incoming) => incoming,
            Err(e) => {
                let _ = reader_a.stop().await;
                return Err(e);
            }
        };

        let pump_ab = Pump::new(
            self.side_a.clone(),
            self.side_b.clone(),
            self.registry.clone(),
            &self.config,
            events.clone(),
        );
        let pump_ba = Pump::new(
            self.side_b.clone(),
            self.side_a.clone(),
            self.registry.clone(),
            &self.config,
            events,
        );
        self.pumps.push(tokio::spawn(pump_ab.run(incoming_a)));
        self.pumps.push(tokio::spawn(pump_ba.run(incoming_b)));
        self.readers = Some((reader_a, reader_b));
        Ok(receiver)
    }

    /// Stops both readers and waits for the pumps to drain.
    pub async fn stop(&mut self) -> EngineResult<()> {
        let Some((mut reader_a, mut reader_b)) = self.readers.take() else {
            return Err(EngineError::NotRunning);
        };
        let _ = reader_a.stop().await;
        let _ = reader_b.stop().await;
        for pump in self.pumps.drain(..) {
            let _ = pump.await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("side_a", &self.config.side_a)
            .field("side_b", &self.config.side_b)
            .field("running", &self.is_running())
            .finish()
    }
}

/// What one change application did at the destination.
enum ApplyOutcome {
    Written(Revision),
    /// The destination already held this exact version.
    Unchanged(Revision),
}

/// Last change applied for one document, per direction.
///
/// A hint only: replaying an already-propagated notification is recognized
/// by `source_revision`, and `dest_revision` saves a lookup before the next
/// update. The store's optimistic check stays the source of truth.
#[derive(Debug, Clone)]
struct Applied {
    source_revision: Revision,
    dest_revision: Revision,
}

struct Pump {
    source: Arc<dyn DocumentStore>,
    dest: Arc<dyn DocumentStore>,
    registry: Arc<MergeRegistry>,
    writer: Writer,
    resolver: Resolver,
    cache: HashMap<DocumentId, Applied>,
    events: mpsc::Sender<ReplicatorEvent>,
    max_attempts: u32,
}

impl Pump {
    fn new(
        source: Arc<dyn DocumentStore>,
        dest: Arc<dyn DocumentStore>,
        registry: Arc<MergeRegistry>,
        config: &ReplicationConfig,
        events: mpsc::Sender<ReplicatorEvent>,
    ) -> Self {
        let writer = Writer::new(dest.clone(), &config.engine);
        let resolver = Resolver::new(source.clone(), registry.clone(), &config.engine);
        Self {
            source,
            dest,
            registry,
            writer,
            resolver,
            cache: HashMap::new(),
            events,
            max_attempts: config.engine.max_update_attempts.max(1),
        }
    }

    async fn run(mut self, mut incoming: mpsc::Receiver<ReaderEvent>) {
        while let Some(event) = incoming.recv().await {
            match event {
                ReaderEvent::Started { side } => {
                    debug!(%side, "replication source started");
                }
                ReaderEvent::Read(version) => self.on_read(version).await,
                ReaderEvent::Deleted { id, revision } => self.on_deleted(id, revision).await,
                ReaderEvent::Conflict(primary) => self.on_conflict(primary).await,
                ReaderEvent::Error { side, message } => {
                    warn!(%side, %message, "replication source error");
                }
                ReaderEvent::Stopped { side } => {
                    let _ = self.events.send(ReplicatorEvent::ReaderStopped { side }).await;
                }
            }
        }
    }

    async fn on_read(&mut self, version: RawVersion) {
        let id = version.entity.id.clone();

        // A change tagged with the destination's side is the echo of a
        // write this driver (or its resolver) made there.
        if &version.side == self.dest.side() {
            debug!(%id, side = %version.side, "skipping echo of destination-side write");
            return;
        }

        // Replay of an already-propagated notification.
        if let Some(applied) = self.cache.get(&id) {
            if applied.source_revision == version.revision {
                debug!(
                    %id,
                    revision = %version.revision,
                    destination = %applied.dest_revision,
                    "change already propagated"
                );
                return;
            }
        }

        match self.apply(&version).await {
            Ok(ApplyOutcome::Written(revision)) => {
                self.cache.insert(
                    id.clone(),
                    Applied {
                        source_revision: version.revision.clone(),
                        dest_revision: revision.clone(),
                    },
                );
                let _ = self
                    .events
                    .send(ReplicatorEvent::Propagated {
                        id,
                        from: self.source.side().clone(),
                        to: self.dest.side().clone(),
                        revision,
                    })
                    .await;
            }
            Ok(ApplyOutcome::Unchanged(revision)) => {
                self.cache.insert(
                    id,
                    Applied {
                        source_revision: version.revision.clone(),
                        dest_revision: revision,
                    },
                );
            }
            Err(e) => {
                warn!(%id, error = %e, from = %self.source.side(), to = %self.dest.side(), "propagation failed");
                let _ = self
                    .events
                    .send(ReplicatorEvent::PropagateFailed {
                        id,
                        from: self.source.side().clone(),
                        to: self.dest.side().clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Applies one source version to the destination.
    ///
    /// Propagation never blindly overwrites: a differing destination state
    /// is merged with the incoming version before the write, so two
    /// directions crossing mid-flight still land both sides on the same
    /// merge result instead of swapping payloads.
    async fn apply(&mut self, version: &RawVersion) -> EngineResult<ApplyOutcome> {
        let id = &version.entity.id;
        let intended = Version {
            entity: version.entity.clone(),
            revision: Revision::none(),
            side: version.side.clone(),
            modified: version.modified,
        };
        let algorithm = self.registry.resolve(&version.entity.kind)?;

        match self.dest.current(id).await? {
            None => match self.dest.create(&intended).await {
                Ok(revision) => Ok(ApplyOutcome::Written(revision)),
                Err(StoreError::Conflict) => {
                    // Create race on the destination: someone landed first,
                    // so merge against whatever is there now.
                    let live = self.writer.live_versions(id).await?;
                    let Some(winner) = live.first() else {
                        return Err(StoreError::NotFound(id.to_string()).into());
                    };
                    let expected = winner.revision.clone();
                    let entity = algorithm.merge(&intended, &live)?;
                    let modified = merged_timestamp(&intended, &live);
                    let merged = Version {
                        entity,
                        revision: Revision::none(),
                        side: intended.side,
                        modified,
                    };
                    let written = self
                        .writer
                        .update_raw(merged, &expected, algorithm.as_ref())
                        .await?;
                    Ok(ApplyOutcome::Written(written.revision))
                }
                Err(e) => Err(e.into()),
            },
            Some(current) => {
                let expected = current.revision.clone();
                let conflicts = std::slice::from_ref(&current);
                let entity = algorithm.merge(&intended, conflicts)?;
                let modified = merged_timestamp(&intended, conflicts);
                if entity.body == current.entity.body && modified == current.modified {
                    // The destination already holds the merge result; a
                    // write would only mint a redundant revision.
                    return Ok(ApplyOutcome::Unchanged(expected));
                }
                let merged = Version {
                    entity,
                    revision: Revision::none(),
                    side: intended.side,
                    modified,
                };
                let written = self
                    .writer
                    .update_raw(merged, &expected, algorithm.as_ref())
                    .await?;
                Ok(ApplyOutcome::Written(written.revision))
            }
        }
    }

    async fn on_deleted(&mut self, id: DocumentId, revision: Revision) {
        self.cache.remove(&id);
        match self.propagate_delete(&id).await {
            Ok(Some(tombstone)) => {
                debug!(%id, %revision, %tombstone, to = %self.dest.side(), "deletion propagated");
                let _ = self
                    .events
                    .send(ReplicatorEvent::Propagated {
                        id,
                        from: self.source.side().clone(),
                        to: self.dest.side().clone(),
                        revision: tombstone,
                    })
                    .await;
            }
            Ok(None) => {
                debug!(%id, to = %self.dest.side(), "deletion target already absent");
            }
            Err(e) => {
                warn!(%id, error = %e, to = %self.dest.side(), "deletion propagation failed");
                let _ = self
                    .events
                    .send(ReplicatorEvent::PropagateFailed {
                        id,
                        from: self.source.side().clone(),
                        to: self.dest.side().clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn propagate_delete(&self, id: &DocumentId) -> EngineResult<Option<Revision>> {
        for _ in 0..self.max_attempts {
            let Some(current) = self.dest.current(id).await? else {
                return Ok(None);
            };
            match self.dest.delete(id, &current.revision).await {
                Ok(revision) => return Ok(Some(revision)),
                Err(StoreError::Conflict) => continue,
                Err(StoreError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::ConcurrentModification {
            id: id.clone(),
            attempts: self.max_attempts,
        })
    }

    async fn on_conflict(&mut self, primary: RawVersion) {
        let id = primary.entity.id.clone();
        match self.resolver.resolve(primary).await {
            Ok(resolved) => {
                let _ = self
                    .events
                    .send(ReplicatorEvent::Resolved {
                        id,
                        side: self.source.side().clone(),
                        revision: resolved.revision,
                    })
                    .await;
            }
            Err(e) => {
                warn!(%id, error = %e, side = %self.source.side(), "conflict resolution failed");
                let _ = self
                    .events
                    .send(ReplicatorEvent::ResolveFailed {
                        id,
                        side: self.source.side().clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }
}
