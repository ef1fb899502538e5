//! In-process reference implementation of [`DocumentStore`].
//!
//! Keeps full revision histories per document, selects winners
//! deterministically, and fans changes out to any number of feed
//! subscribers. Used by the engine's tests and by anyone who wants two
//! sides in one process without a real store deployment.
//!
//! Revision format: `"<generation>-<opaque suffix>"`. The winner among
//! simultaneously-live revisions is the one with the highest generation,
//! then the lexicographically greatest stamp — the same rule every replica
//! of this store would apply, so winner selection is deterministic.
//!
//! [`MemoryStore::force_insert`] plants a divergent live revision without
//! going through the optimistic check, standing in for an external
//! multi-master store that grew a conflict on its own. Tests use it to
//! exercise the conflict-resolution path.

use crate::error::{StoreError, StoreResult};
use crate::feed::{ChangeFeed, FEED_BUFFER};
use crate::DocumentStore;
use async_trait::async_trait;
use duplex_types::{Change, DocumentId, HybridTimestamp, RawDocument, RawVersion, Revision, SideId, Version};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const NOTIFY_BUFFER: usize = 256;

#[derive(Debug, Clone)]
enum FeedSignal {
    Change(Change),
    Closed,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    kind: String,
    body: serde_json::Value,
    side: SideId,
    modified: HybridTimestamp,
}

#[derive(Debug, Default)]
struct DocumentHistory {
    revisions: HashMap<Revision, StoredVersion>,
    /// Currently-live revisions, winner first.
    live: Vec<Revision>,
    /// Highest generation minted so far.
    generation: u64,
    deleted: bool,
}

impl DocumentHistory {
    fn sort_live(&mut self) {
        self.live.sort_by(|a, b| {
            (generation_of(b), b.as_str()).cmp(&(generation_of(a), a.as_str()))
        });
    }

    fn winner(&self) -> Option<&Revision> {
        self.live.first()
    }
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<DocumentId, DocumentHistory>,
    log: Vec<Change>,
    seq: u64,
    closed: bool,
}

/// An in-memory side.
pub struct MemoryStore {
    side: SideId,
    inner: Arc<Mutex<Inner>>,
    notify: broadcast::Sender<FeedSignal>,
}

fn generation_of(revision: &Revision) -> u64 {
    revision
        .as_str()
        .split_once('-')
        .and_then(|(g, _)| g.parse().ok())
        .unwrap_or(0)
}

fn mint(generation: u64) -> Revision {
    Revision::new(format!("{generation}-{}", Uuid::new_v4().simple()))
}

impl MemoryStore {
    /// Creates an empty store for the given side.
    #[must_use]
    pub fn new(side: SideId) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_BUFFER);
        Self {
            side,
            inner: Arc::new(Mutex::new(Inner::default())),
            notify,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, inner: &mut Inner, id: &DocumentId, deleted: bool) -> Change {
        inner.seq += 1;
        let revisions = inner
            .docs
            .get(id)
            .map(|doc| doc.live.clone())
            .unwrap_or_default();
        let change = Change {
            seq: inner.seq,
            id: id.clone(),
            revisions,
            deleted,
        };
        inner.log.push(change.clone());
        change
    }

    fn publish(&self, change: Change) {
        // No subscribers is fine.
        let _ = self.notify.send(FeedSignal::Change(change));
    }

    /// Marks the store as gone: subsequent calls fail with
    /// [`StoreError::Closed`] and every live feed terminates.
    pub fn close(&self) {
        self.lock().closed = true;
        let _ = self.notify.send(FeedSignal::Closed);
    }

    /// Plants an additional live revision without the optimistic check,
    /// creating (or widening) a conflict set. Supply a non-empty revision
    /// to control winner selection; an empty one gets the winner's
    /// generation minted fresh.
    pub fn force_insert(&self, version: &RawVersion) -> StoreResult<Revision> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let id = version.entity.id.clone();
        let doc = inner.docs.entry(id.clone()).or_default();
        let revision = if version.revision.is_empty() {
            mint(doc.generation.max(1))
        } else {
            version.revision.clone()
        };
        doc.revisions.insert(
            revision.clone(),
            StoredVersion {
                kind: version.entity.kind.clone(),
                body: version.entity.body.clone(),
                side: version.side.clone(),
                modified: version.modified,
            },
        );
        doc.live.push(revision.clone());
        doc.generation = doc.generation.max(generation_of(&revision));
        doc.deleted = false;
        doc.sort_live();
        let change = self.record(&mut inner, &id, false);
        drop(inner);
        self.publish(change);
        Ok(revision)
    }

    /// Injects an arbitrary change record into the feed, bypassing the
    /// document table. Lets tests deliver records the store cannot back up
    /// with data (malformed-record handling).
    pub fn inject_change(&self, id: DocumentId, revisions: Vec<Revision>, deleted: bool) {
        let mut inner = self.lock();
        inner.seq += 1;
        let change = Change {
            seq: inner.seq,
            id,
            revisions,
            deleted,
        };
        inner.log.push(change.clone());
        drop(inner);
        self.publish(change);
    }

    fn assemble(&self, id: &DocumentId, revision: &Revision, stored: &StoredVersion) -> RawVersion {
        Version {
            entity: RawDocument::new(id.clone(), stored.kind.clone(), stored.body.clone()),
            revision: revision.clone(),
            side: stored.side.clone(),
            modified: stored.modified,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn side(&self) -> &SideId {
        &self.side
    }

    async fn create(&self, version: &RawVersion) -> StoreResult<Revision> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let id = version.entity.id.clone();
        let doc = inner.docs.entry(id.clone()).or_default();
        if !doc.deleted && !doc.live.is_empty() {
            return Err(StoreError::Conflict);
        }
        doc.generation += 1;
        let revision = mint(doc.generation);
        doc.revisions.insert(
            revision.clone(),
            StoredVersion {
                kind: version.entity.kind.clone(),
                body: version.entity.body.clone(),
                side: version.side.clone(),
                modified: version.modified,
            },
        );
        doc.live = vec![revision.clone()];
        doc.deleted = false;
        let change = self.record(&mut inner, &id, false);
        drop(inner);
        self.publish(change);
        Ok(revision)
    }

    async fn update(&self, version: &RawVersion, expected: &Revision) -> StoreResult<Revision> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let id = version.entity.id.clone();
        let doc = inner
            .docs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if doc.deleted {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if doc.winner() != Some(expected) {
            return Err(StoreError::Conflict);
        }
        doc.generation += 1;
        let revision = mint(doc.generation);
        doc.revisions.insert(
            revision.clone(),
            StoredVersion {
                kind: version.entity.kind.clone(),
                body: version.entity.body.clone(),
                side: version.side.clone(),
                modified: version.modified,
            },
        );
        // Replacing the winner supersedes every live branch at once.
        doc.live = vec![revision.clone()];
        let change = self.record(&mut inner, &id, false);
        drop(inner);
        self.publish(change);
        Ok(revision)
    }

    async fn delete(&self, id: &DocumentId, expected: &Revision) -> StoreResult<Revision> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let doc = inner
            .docs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if doc.deleted {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if doc.winner() != Some(expected) {
            return Err(StoreError::Conflict);
        }
        let kind = doc
            .revisions
            .get(expected)
            .map(|v| v.kind.clone())
            .unwrap_or_default();
        doc.generation += 1;
        let revision = mint(doc.generation);
        doc.revisions.insert(
            revision.clone(),
            StoredVersion {
                kind,
                body: serde_json::Value::Null,
                side: self.side.clone(),
                modified: HybridTimestamp::now(),
            },
        );
        doc.live = vec![revision.clone()];
        doc.deleted = true;
        let change = self.record(&mut inner, id, true);
        drop(inner);
        self.publish(change);
        Ok(revision)
    }

    async fn current(&self, id: &DocumentId) -> StoreResult<Option<RawVersion>> {
        let inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let Some(doc) = inner.docs.get(id) else {
            return Ok(None);
        };
        if doc.deleted {
            return Ok(None);
        }
        let Some(winner) = doc.winner() else {
            return Ok(None);
        };
        let stored = doc
            .revisions
            .get(winner)
            .ok_or_else(|| StoreError::Malformed(format!("live revision {winner} has no data")))?;
        Ok(Some(self.assemble(id, winner, stored)))
    }

    async fn conflict_revisions(&self, id: &DocumentId) -> StoreResult<Vec<Revision>> {
        let inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let doc = inner
            .docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if doc.deleted {
            return Ok(Vec::new());
        }
        Ok(doc.live.clone())
    }

    async fn fetch(&self, id: &DocumentId, revision: &Revision) -> StoreResult<RawVersion> {
        let inner = self.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        let stored = inner
            .docs
            .get(id)
            .and_then(|doc| doc.revisions.get(revision))
            .ok_or_else(|| StoreError::NotFound(format!("{id}@{revision}")))?;
        Ok(self.assemble(id, revision, stored))
    }

    async fn changes(&self, since: u64) -> StoreResult<ChangeFeed> {
        let (backlog, mut live) = {
            let inner = self.lock();
            if inner.closed {
                return Err(StoreError::Closed);
            }
            let backlog: Vec<Change> = inner
                .log
                .iter()
                .filter(|c| c.seq > since)
                .cloned()
                .collect();
            // Subscribe while holding the lock so no change falls between
            // the snapshot and the live subscription.
            (backlog, self.notify.subscribe())
        };

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        tokio::spawn(async move {
            let mut last = since;
            for change in backlog {
                last = change.seq;
                if tx.send(Ok(change)).await.is_err() {
                    return;
                }
            }
            loop {
                match live.recv().await {
                    Ok(FeedSignal::Change(change)) if change.seq > last => {
                        last = change.seq;
                        if tx.send(Ok(change)).await.is_err() {
                            return;
                        }
                    }
                    Ok(FeedSignal::Change(_)) => {}
                    Ok(FeedSignal::Closed) => {
                        let _ = tx.send(Err(StoreError::Closed)).await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        let _ = tx
                            .send(Err(StoreError::Connection(format!(
                                "change feed lagged by {n} records"
                            ))))
                            .await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(ChangeFeed::new(rx))
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("side", &self.side)
            .finish_non_exhaustive()
    }
}
