#![allow(dead_code)]

use duplex_merge::{LwwDocument, MergeRegistry, Replicated};
use duplex_store::memory::MemoryStore;
use duplex_types::{DocumentId, SideId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Test entity with LWW-friendly fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub priority: i64,
}

impl Replicated for Note {
    const KIND: &'static str = "note";

    fn id(&self) -> DocumentId {
        DocumentId::new(&self.id)
    }
}

pub fn note(id: &str, title: &str, priority: i64) -> Note {
    Note {
        id: id.to_string(),
        title: title.to_string(),
        priority,
    }
}

pub fn memory_side(name: &str) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(SideId::new(name)))
}

pub fn note_registry() -> Arc<MergeRegistry> {
    let mut registry = MergeRegistry::new();
    registry.register::<Note>(LwwDocument).unwrap();
    registry.build().unwrap();
    Arc::new(registry)
}

/// Polls an async condition until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
