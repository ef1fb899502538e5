use duplex_store::memory::MemoryStore;
use duplex_store::{DocumentStore, StoreError};
use duplex_types::{DocumentId, HybridTimestamp, RawDocument, RawVersion, Revision, SideId, Version};
use pretty_assertions::assert_eq;
use serde_json::json;

fn store() -> MemoryStore {
    MemoryStore::new(SideId::new("a"))
}

fn doc(id: &str, body: serde_json::Value) -> RawVersion {
    Version::new(
        RawDocument::new(DocumentId::new(id), "note", body),
        SideId::new("a"),
        HybridTimestamp::new(100, 0),
    )
}

// ── Create / current / fetch ─────────────────────────────────────

#[tokio::test]
async fn create_assigns_a_first_generation_revision() {
    let store = store();
    let rev = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    assert!(rev.as_str().starts_with("1-"));

    let current = store.current(&DocumentId::new("d1")).await.unwrap().unwrap();
    assert_eq!(current.revision, rev);
    assert_eq!(current.entity.body, json!({"v": 1}));
    assert_eq!(current.side, SideId::new("a"));
}

#[tokio::test]
async fn create_of_an_existing_document_conflicts() {
    let store = store();
    store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let err = store.create(&doc("d1", json!({"v": 2}))).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict));
}

#[tokio::test]
async fn fetch_returns_historical_revisions() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let r2 = store.update(&doc("d1", json!({"v": 2})), &r1).await.unwrap();

    let old = store.fetch(&DocumentId::new("d1"), &r1).await.unwrap();
    assert_eq!(old.entity.body, json!({"v": 1}));
    let new = store.fetch(&DocumentId::new("d1"), &r2).await.unwrap();
    assert_eq!(new.entity.body, json!({"v": 2}));
}

#[tokio::test]
async fn fetch_unknown_revision_is_not_found() {
    let store = store();
    store.create(&doc("d1", json!({}))).await.unwrap();
    let err = store
        .fetch(&DocumentId::new("d1"), &Revision::new("9-nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn current_of_unknown_document_is_none() {
    let store = store();
    assert!(store.current(&DocumentId::new("nope")).await.unwrap().is_none());
}

// ── Optimistic update ────────────────────────────────────────────

#[tokio::test]
async fn update_advances_exactly_one_generation() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let r2 = store.update(&doc("d1", json!({"v": 2})), &r1).await.unwrap();
    assert!(r2.as_str().starts_with("2-"));
    let r3 = store.update(&doc("d1", json!({"v": 3})), &r2).await.unwrap();
    assert!(r3.as_str().starts_with("3-"));
}

#[tokio::test]
async fn update_with_a_stale_revision_conflicts() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    store.update(&doc("d1", json!({"v": 2})), &r1).await.unwrap();

    let err = store
        .update(&doc("d1", json!({"v": 99})), &r1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict));
}

#[tokio::test]
async fn update_of_unknown_document_is_not_found() {
    let store = store();
    let err = store
        .update(&doc("ghost", json!({})), &Revision::new("1-x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

// ── Deletion ─────────────────────────────────────────────────────

#[tokio::test]
async fn delete_tombstones_the_document() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let tomb = store.delete(&DocumentId::new("d1"), &r1).await.unwrap();
    assert!(tomb.as_str().starts_with("2-"));

    assert!(store.current(&DocumentId::new("d1")).await.unwrap().is_none());
    assert!(store
        .conflict_revisions(&DocumentId::new("d1"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn create_revives_a_deleted_document() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    store.delete(&DocumentId::new("d1"), &r1).await.unwrap();

    let r3 = store.create(&doc("d1", json!({"v": 2}))).await.unwrap();
    assert!(r3.as_str().starts_with("3-"));
    let current = store.current(&DocumentId::new("d1")).await.unwrap().unwrap();
    assert_eq!(current.entity.body, json!({"v": 2}));
}

// ── Conflict sets ────────────────────────────────────────────────

#[tokio::test]
async fn force_insert_widens_the_conflict_set() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();

    let mut divergent = doc("d1", json!({"v": 2}));
    divergent.revision = Revision::new("1-zzzzzzzz");
    divergent.side = SideId::new("b");
    store.force_insert(&divergent).unwrap();

    let live = store
        .conflict_revisions(&DocumentId::new("d1"))
        .await
        .unwrap();
    assert_eq!(live.len(), 2);
    assert!(live.contains(&r1));
    assert!(live.contains(&Revision::new("1-zzzzzzzz")));
}

#[tokio::test]
async fn winner_is_highest_generation_then_lexicographic() {
    let store = store();
    store.create(&doc("d1", json!({"v": 1}))).await.unwrap();

    let mut divergent = doc("d1", json!({"v": 2}));
    divergent.revision = Revision::new("2-aaa");
    store.force_insert(&divergent).unwrap();

    let live = store
        .conflict_revisions(&DocumentId::new("d1"))
        .await
        .unwrap();
    assert_eq!(live[0], Revision::new("2-aaa"));

    let current = store.current(&DocumentId::new("d1")).await.unwrap().unwrap();
    assert_eq!(current.entity.body, json!({"v": 2}));
}

#[tokio::test]
async fn updating_the_winner_collapses_the_conflict_set() {
    let store = store();
    store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let mut divergent = doc("d1", json!({"v": 2}));
    divergent.revision = Revision::new("2-aaa");
    store.force_insert(&divergent).unwrap();

    let resolved = store
        .update(&doc("d1", json!({"v": 3})), &Revision::new("2-aaa"))
        .await
        .unwrap();

    let live = store
        .conflict_revisions(&DocumentId::new("d1"))
        .await
        .unwrap();
    assert_eq!(live, vec![resolved]);
}

#[tokio::test]
async fn updating_a_losing_branch_conflicts() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let mut divergent = doc("d1", json!({"v": 2}));
    divergent.revision = Revision::new("2-aaa");
    store.force_insert(&divergent).unwrap();

    // r1 is generation 1, a losing branch now.
    let err = store.update(&doc("d1", json!({"v": 9})), &r1).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict));
}

// ── Change feed ──────────────────────────────────────────────────

#[tokio::test]
async fn feed_delivers_changes_in_sequence_order() {
    let store = store();
    let mut feed = store.changes(0).await.unwrap();

    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let r2 = store.update(&doc("d1", json!({"v": 2})), &r1).await.unwrap();

    let first = feed.next().await.unwrap().unwrap();
    assert_eq!(first.seq, 1);
    assert_eq!(first.revisions, vec![r1]);
    let second = feed.next().await.unwrap().unwrap();
    assert_eq!(second.seq, 2);
    assert_eq!(second.revisions, vec![r2]);
}

#[tokio::test]
async fn feed_catches_up_from_since() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let r2 = store.update(&doc("d1", json!({"v": 2})), &r1).await.unwrap();

    let mut feed = store.changes(1).await.unwrap();
    let only = feed.next().await.unwrap().unwrap();
    assert_eq!(only.seq, 2);
    assert_eq!(only.revisions, vec![r2]);
}

#[tokio::test]
async fn deletions_arrive_as_tombstones() {
    let store = store();
    let r1 = store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    store.delete(&DocumentId::new("d1"), &r1).await.unwrap();

    let mut feed = store.changes(1).await.unwrap();
    let change = feed.next().await.unwrap().unwrap();
    assert!(change.deleted);
    assert_eq!(change.id, DocumentId::new("d1"));
}

#[tokio::test]
async fn conflicting_documents_report_every_live_revision() {
    let store = store();
    store.create(&doc("d1", json!({"v": 1}))).await.unwrap();
    let mut divergent = doc("d1", json!({"v": 2}));
    divergent.revision = Revision::new("2-aaa");
    store.force_insert(&divergent).unwrap();

    let mut feed = store.changes(1).await.unwrap();
    let change = feed.next().await.unwrap().unwrap();
    assert_eq!(change.revisions.len(), 2);
    assert_eq!(change.winner(), Some(&Revision::new("2-aaa")));
}

#[tokio::test]
async fn injected_changes_reach_subscribers() {
    let store = store();
    let mut feed = store.changes(0).await.unwrap();

    store.inject_change(DocumentId::new("ghost"), vec![Revision::new("7-x")], false);
    let change = feed.next().await.unwrap().unwrap();
    assert_eq!(change.id, DocumentId::new("ghost"));
    assert_eq!(change.revisions, vec![Revision::new("7-x")]);
}

// ── Close ────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_store_rejects_operations() {
    let store = store();
    store.close();
    let err = store.create(&doc("d1", json!({}))).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
    let err = store.current(&DocumentId::new("d1")).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}

#[tokio::test]
async fn close_terminates_live_feeds() {
    let store = store();
    let mut feed = store.changes(0).await.unwrap();
    store.close();

    let last = feed.next().await.unwrap();
    assert!(matches!(last, Err(StoreError::Closed)));
    assert!(feed.next().await.is_none());
}
