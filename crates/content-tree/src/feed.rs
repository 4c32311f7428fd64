//! Full-collection snapshots driven by the store's change channel.

use crate::path::CollectionPath;
use crate::store::{Document, EntityStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;

/// Lazy, infinite sequence of snapshots of one collection.
///
/// The first call yields the current contents; every later call yields the
/// whole collection again after a write touches it. Nothing is read until
/// asked for, and [`Snapshots::restart`] starts the sequence over.
pub struct Snapshots {
    store: Arc<dyn EntityStore>,
    collection: CollectionPath,
    rx: Receiver<CollectionPath>,
    primed: bool,
}

impl Snapshots {
    pub fn new(store: Arc<dyn EntityStore>, collection: CollectionPath) -> Self {
        let rx = store.changes();
        Self {
            store,
            collection,
            rx,
            primed: false,
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Wait for the next snapshot.
    pub async fn next(&mut self) -> StoreResult<Vec<Document>> {
        if !self.primed {
            self.primed = true;
            return self.read();
        }
        loop {
            match self.rx.recv().await {
                Ok(path) if path == self.collection => return self.read(),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::trace!(collection = %self.collection, skipped, "snapshot feed lagged");
                    return self.read();
                }
                Err(RecvError::Closed) => return Err(StoreError::FeedClosed),
            }
        }
    }

    /// Non-blocking variant of [`Snapshots::next`]: `None` when nothing changed.
    pub fn try_next(&mut self) -> StoreResult<Option<Vec<Document>>> {
        if !self.primed {
            self.primed = true;
            return self.read().map(Some);
        }
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(path) => changed |= path == self.collection,
                Err(TryRecvError::Lagged(_)) => changed = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => return Err(StoreError::FeedClosed),
            }
        }
        if changed {
            self.read().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Start over: the next call yields the current snapshot again.
    pub fn restart(&mut self) {
        self.rx = self.store.changes();
        self.primed = false;
    }

    fn read(&self) -> StoreResult<Vec<Document>> {
        self.store.list(&self.collection)
    }
}

/// Ids that differ between two snapshots of the same collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl SnapshotDiff {
    pub fn between(old: &[Document], new: &[Document]) -> Self {
        let before: HashMap<&str, &Document> = old.iter().map(|d| (d.id(), d)).collect();
        let after: HashMap<&str, &Document> = new.iter().map(|d| (d.id(), d)).collect();

        let mut diff = Self::default();
        for doc in new {
            match before.get(doc.id()) {
                None => diff.added.push(doc.id().to_string()),
                Some(prev) if prev.data != doc.data => diff.changed.push(doc.id().to_string()),
                Some(_) => {}
            }
        }
        diff.removed = old
            .iter()
            .filter(|d| !after.contains_key(d.id()))
            .map(|d| d.id().to_string())
            .collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use serde_json::json;
    use std::time::Duration;

    fn setup() -> (Arc<dyn EntityStore>, CollectionPath) {
        let store: Arc<dyn EntityStore> = Arc::new(SqliteStore::in_memory().unwrap());
        (store, CollectionPath::root("subjects"))
    }

    #[tokio::test]
    async fn test_first_snapshot_is_current() {
        let (store, subjects) = setup();
        store.create(&subjects, json!({"name": "A"})).unwrap();

        let mut snapshots = Snapshots::new(store.clone(), subjects.clone());
        let first = snapshots.next().await.unwrap();
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_yields_full_collection_after_write() {
        let (store, subjects) = setup();
        let mut snapshots = Snapshots::new(store.clone(), subjects.clone());
        assert!(snapshots.next().await.unwrap().is_empty());

        store.create(&subjects, json!({"name": "A"})).unwrap();
        store.create(&subjects, json!({"name": "B"})).unwrap();

        let snapshot = snapshots.next().await.unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_ignores_other_collections() {
        let (store, subjects) = setup();
        let mut snapshots = Snapshots::new(store.clone(), subjects.clone());
        snapshots.next().await.unwrap();

        store.create(&CollectionPath::root("courses"), json!({})).unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), snapshots.next()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_try_next() {
        let (store, subjects) = setup();
        let mut snapshots = Snapshots::new(store.clone(), subjects.clone());

        assert_eq!(snapshots.try_next().unwrap().map(|s| s.len()), Some(0));
        assert!(snapshots.try_next().unwrap().is_none());

        let doc = store.create(&subjects, json!({"name": "A"})).unwrap();
        store.update(&doc, json!({"name": "B"})).unwrap();
        let snapshot = snapshots.try_next().unwrap().unwrap();
        assert_eq!(snapshot[0].data["name"], "B");
        assert!(snapshots.try_next().unwrap().is_none());
    }

    #[test]
    fn test_restart() {
        let (store, subjects) = setup();
        let mut snapshots = Snapshots::new(store.clone(), subjects.clone());
        snapshots.try_next().unwrap();
        snapshots.restart();
        assert!(snapshots.try_next().unwrap().is_some());
    }

    #[test]
    fn test_diff() {
        let (store, subjects) = setup();
        let a = store.create(&subjects, json!({"name": "A"})).unwrap();
        let b = store.create(&subjects, json!({"name": "B"})).unwrap();
        let old = store.list(&subjects).unwrap();

        store.delete(&a).unwrap();
        store.update(&b, json!({"name": "B2"})).unwrap();
        let c = store.create(&subjects, json!({"name": "C"})).unwrap();
        let new = store.list(&subjects).unwrap();

        let diff = SnapshotDiff::between(&old, &new);
        assert_eq!(diff.added, vec![c.id().to_string()]);
        assert_eq!(diff.removed, vec![a.id().to_string()]);
        assert_eq!(diff.changed, vec![b.id().to_string()]);
        assert!(SnapshotDiff::between(&new, &new).is_empty());
    }
}
