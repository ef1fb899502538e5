mod common;

use common::{memory_side, note, Note};
use duplex_engine::{ChangeReader, EngineConfig, EngineError, ReaderEvent, Writer};
use duplex_merge::Replicated;
use duplex_store::memory::MemoryStore;
use duplex_store::DocumentStore;
use duplex_types::{DocumentId, HybridTimestamp, Revision, SideId, Version};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn reader(store: Arc<MemoryStore>) -> ChangeReader {
    ChangeReader::new(store, &EngineConfig::default())
}

async fn next_event(events: &mut mpsc::Receiver<ReaderEvent>) -> ReaderEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for reader event")
        .expect("event stream ended unexpectedly")
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn start_emits_started_and_stop_emits_stopped() {
    let store = memory_side("a");
    let mut reader = reader(store);

    let mut events = reader.start().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Started { side } if side == SideId::new("a")
    ));
    assert!(reader.is_running());

    reader.stop().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Stopped { side } if side == SideId::new("a")
    ));
    assert!(!reader.is_running());
}

#[tokio::test]
async fn double_start_is_rejected() {
    let store = memory_side("a");
    let mut reader = reader(store);
    let _events = reader.start().await.unwrap();
    assert!(matches!(
        reader.start().await.unwrap_err(),
        EngineError::AlreadyRunning
    ));
}

#[tokio::test]
async fn stop_without_start_is_rejected() {
    let store = memory_side("a");
    let mut reader = reader(store);
    assert!(matches!(
        reader.stop().await.unwrap_err(),
        EngineError::NotRunning
    ));
}

// ── Classification ───────────────────────────────────────────────

#[tokio::test]
async fn plain_writes_arrive_as_reads() {
    let store = memory_side("a");
    let writer = Writer::new(store.clone(), &EngineConfig::default());
    let mut reader = reader(store);

    let mut events = reader.start().await.unwrap();
    next_event(&mut events).await; // Started

    let created = writer
        .try_create(note("n1", "hello", 1), HybridTimestamp::new(100, 0))
        .await
        .unwrap()
        .created()
        .unwrap();

    match next_event(&mut events).await {
        ReaderEvent::Read(version) => {
            assert_eq!(version.entity.id, DocumentId::new("n1"));
            assert_eq!(version.revision, created.revision);
            assert_eq!(version.side, SideId::new("a"));
            let body: Note = serde_json::from_value(version.entity.body).unwrap();
            assert_eq!(body.title, "hello");
        }
        other => panic!("expected Read, got {other:?}"),
    }
}

#[tokio::test]
async fn deletions_arrive_as_deleted() {
    let store = memory_side("a");
    let writer = Writer::new(store.clone(), &EngineConfig::default());

    let created = writer
        .try_create(note("n1", "hello", 1), HybridTimestamp::now())
        .await
        .unwrap()
        .created()
        .unwrap();

    let mut reader = reader(store.clone());
    let mut events = reader.start().await.unwrap();
    next_event(&mut events).await; // Started
    next_event(&mut events).await; // Read of the create

    store
        .delete(&DocumentId::new("n1"), &created.revision)
        .await
        .unwrap();

    match next_event(&mut events).await {
        ReaderEvent::Deleted { id, revision } => {
            assert_eq!(id, DocumentId::new("n1"));
            assert!(!revision.is_empty());
        }
        other => panic!("expected Deleted, got {other:?}"),
    }
}

#[tokio::test]
async fn conflict_sets_arrive_as_conflicts_with_the_winner() {
    let store = memory_side("a");
    let writer = Writer::new(store.clone(), &EngineConfig::default());

    writer
        .try_create(note("n1", "ours", 1), HybridTimestamp::new(100, 0))
        .await
        .unwrap();

    let mut reader = reader(store.clone());
    let mut events = reader.start().await.unwrap();
    next_event(&mut events).await; // Started
    next_event(&mut events).await; // Read of the create

    let divergent = Version::new(
        note("n1", "theirs", 2).to_raw().unwrap(),
        SideId::new("b"),
        HybridTimestamp::new(200, 0),
    )
    .with_revision(Revision::new("2-zzz"));
    store.force_insert(&divergent).unwrap();

    match next_event(&mut events).await {
        ReaderEvent::Conflict(primary) => {
            assert_eq!(primary.revision, Revision::new("2-zzz"));
            let body: Note = serde_json::from_value(primary.entity.body).unwrap();
            assert_eq!(body.title, "theirs");
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

// ── Fault handling ───────────────────────────────────────────────

#[tokio::test]
async fn unreadable_records_emit_error_and_the_stream_continues() {
    let store = memory_side("a");
    let writer = Writer::new(store.clone(), &EngineConfig::default());
    let mut reader = reader(store.clone());

    let mut events = reader.start().await.unwrap();
    next_event(&mut events).await; // Started

    // A record referencing a revision the store cannot serve.
    store.inject_change(
        DocumentId::new("ghost"),
        vec![Revision::new("9-missing")],
        false,
    );
    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Error { .. }
    ));

    // A record carrying no revisions at all.
    store.inject_change(DocumentId::new("ghost"), Vec::new(), false);
    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Error { .. }
    ));

    // The stream is still alive and classifies the next good record.
    writer
        .try_create(note("n1", "alive", 1), HybridTimestamp::now())
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Read(_)
    ));
    assert!(reader.is_running());
}

#[tokio::test]
async fn connection_loss_stops_the_reader() {
    let store = memory_side("a");
    let mut reader = reader(store.clone());

    let mut events = reader.start().await.unwrap();
    next_event(&mut events).await; // Started

    store.close();

    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Error { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ReaderEvent::Stopped { .. }
    ));

    let deadline = common::eventually(|| {
        let running = reader.is_running();
        async move { !running }
    })
    .await;
    assert!(deadline, "reader task should terminate after connection loss");
}

// ── Catch-up ─────────────────────────────────────────────────────

#[tokio::test]
async fn with_since_skips_already_seen_changes() {
    let store = memory_side("a");
    let writer = Writer::new(store.clone(), &EngineConfig::default());

    let created = writer
        .try_create(note("n1", "v1", 1), HybridTimestamp::new(100, 0))
        .await
        .unwrap()
        .created()
        .unwrap();
    writer
        .update(
            note("n1", "v2", 2),
            &created.revision,
            HybridTimestamp::new(200, 0),
            duplex_merge::LwwDocument,
        )
        .await
        .unwrap();

    let mut reader = ChangeReader::new(store, &EngineConfig::default()).with_since(1);
    let mut events = reader.start().await.unwrap();
    next_event(&mut events).await; // Started

    match next_event(&mut events).await {
        ReaderEvent::Read(version) => {
            let body: Note = serde_json::from_value(version.entity.body).unwrap();
            assert_eq!(body.title, "v2");
        }
        other => panic!("expected Read of the second change, got {other:?}"),
    }
}
