//! Hierarchical document store.
//!
//! Documents are JSON objects addressed by slash-separated paths. Every write
//! is announced on a broadcast channel carrying the collection it touched, so
//! [`Snapshots`](crate::Snapshots) can re-read full collections on change.

use crate::models::Entity;
use crate::path::{CollectionPath, DocPath};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Document at {0} is not a JSON object")]
    NotAnObject(String),
    #[error("Change feed closed")]
    FeedClosed,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored document and its path.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Value,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Decode into a model, filling its id from the path.
    pub fn decode<T: DeserializeOwned + Entity>(&self) -> StoreResult<T> {
        let mut model: T = serde_json::from_value(self.data.clone())?;
        model.set_id(self.id().to_string());
        Ok(model)
    }
}

/// Operations the catalog needs from a document store.
pub trait EntityStore: Send + Sync {
    /// Add a document with a generated id.
    fn create(&self, collection: &CollectionPath, data: Value) -> StoreResult<DocPath>;

    /// Point read; `None` when absent.
    fn get(&self, doc: &DocPath) -> StoreResult<Option<Document>>;

    /// Merge top-level fields into an existing document.
    fn update(&self, doc: &DocPath, fields: Value) -> StoreResult<()>;

    /// Remove a document. Returns whether it existed.
    fn delete(&self, doc: &DocPath) -> StoreResult<bool>;

    /// Every document of a collection, in creation order.
    fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>>;

    /// Atomically add `delta` to an integer field, saturating at zero.
    ///
    /// A missing field counts as zero. Returns the new value.
    fn adjust_counter(&self, doc: &DocPath, field: &str, delta: i64) -> StoreResult<i64>;

    /// Receiver of collection paths touched by writes.
    fn changes(&self) -> broadcast::Receiver<CollectionPath>;
}

/// SQLite-backed [`EntityStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<CollectionPath>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let store = Self {
            conn: Mutex::new(conn),
            changes,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> StoreResult<()> {
        self.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                collection TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, collection: CollectionPath) {
        // No receivers is fine.
        let _ = self.changes.send(collection);
    }
}

impl EntityStore for SqliteStore {
    fn create(&self, collection: &CollectionPath, data: Value) -> StoreResult<DocPath> {
        let doc = collection.doc(&Uuid::new_v4().simple().to_string());
        if !data.is_object() {
            return Err(StoreError::NotAnObject(doc.to_string()));
        }
        self.lock().execute(
            "INSERT INTO documents (path, collection, data) VALUES (?1, ?2, ?3)",
            params![doc.as_str(), collection.as_str(), serde_json::to_string(&data)?],
        )?;
        tracing::debug!(path = %doc, "created document");
        self.notify(collection.clone());
        Ok(doc)
    }

    fn get(&self, doc: &DocPath) -> StoreResult<Option<Document>> {
        let raw: Option<String> = self
            .lock()
            .query_row(
                "SELECT data FROM documents WHERE path = ?1",
                params![doc.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(Document {
                path: doc.clone(),
                data: serde_json::from_str(&raw)?,
            })),
            None => Ok(None),
        }
    }

    fn update(&self, doc: &DocPath, fields: Value) -> StoreResult<()> {
        let Value::Object(fields) = fields else {
            return Err(StoreError::NotAnObject(doc.to_string()));
        };
        {
            let mut conn = self.lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut data = read_object(&tx, doc)?;
            for (key, value) in fields {
                data.insert(key, value);
            }
            write_object(&tx, doc, &data)?;
            tx.commit()?;
        }
        tracing::debug!(path = %doc, "updated document");
        self.notify(doc.parent());
        Ok(())
    }

    fn delete(&self, doc: &DocPath) -> StoreResult<bool> {
        let removed = self
            .lock()
            .execute("DELETE FROM documents WHERE path = ?1", params![doc.as_str()])?;
        if removed > 0 {
            tracing::debug!(path = %doc, "deleted document");
            self.notify(doc.parent());
        }
        Ok(removed > 0)
    }

    fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>> {
        let rows = {
            let conn = self.lock();
            let mut stmt =
                conn.prepare("SELECT path, data FROM documents WHERE collection = ?1 ORDER BY seq")?;
            let rows = stmt
                .query_map(params![collection.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(path, raw)| {
                Ok(Document {
                    path: DocPath::from_raw(path),
                    data: serde_json::from_str(&raw)?,
                })
            })
            .collect()
    }

    fn adjust_counter(&self, doc: &DocPath, field: &str, delta: i64) -> StoreResult<i64> {
        let updated = {
            let mut conn = self.lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut data = read_object(&tx, doc)?;
            let current = data.get(field).and_then(counter_value).unwrap_or(0);
            let updated = current.saturating_add(delta).max(0);
            data.insert(field.to_string(), Value::from(updated));
            write_object(&tx, doc, &data)?;
            tx.commit()?;
            updated
        };
        tracing::debug!(path = %doc, field, delta, updated, "adjusted counter");
        self.notify(doc.parent());
        Ok(updated)
    }

    fn changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.changes.subscribe()
    }
}

fn read_object(conn: &Connection, doc: &DocPath) -> StoreResult<Map<String, Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE path = ?1",
            params![doc.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
    match serde_json::from_str(&raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(doc.to_string())),
    }
}

fn write_object(conn: &Connection, doc: &DocPath, data: &Map<String, Value>) -> StoreResult<()> {
    conn.execute(
        "UPDATE documents SET data = ?2 WHERE path = ?1",
        params![doc.as_str(), serde_json::to_string(data)?],
    )?;
    Ok(())
}

fn counter_value(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subjects() -> CollectionPath {
        CollectionPath::root("subjects")
    }

    #[test]
    fn test_document_crud() {
        let store = SqliteStore::in_memory().unwrap();
        let doc = store.create(&subjects(), json!({"name": "Maths"})).unwrap();
        assert_eq!(doc.parent(), subjects());

        let loaded = store.get(&doc).unwrap().unwrap();
        assert_eq!(loaded.data["name"], "Maths");

        store.update(&doc, json!({"category": "Science"})).unwrap();
        let loaded = store.get(&doc).unwrap().unwrap();
        assert_eq!(loaded.data, json!({"name": "Maths", "category": "Science"}));

        assert!(store.delete(&doc).unwrap());
        assert!(!store.delete(&doc).unwrap());
        assert!(store.get(&doc).unwrap().is_none());
    }

    #[test]
    fn test_update_missing() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.update(&subjects().doc("nope"), json!({"a": 1})).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_rejects_non_objects() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.create(&subjects(), json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
    }

    #[test]
    fn test_list_keeps_creation_order() {
        let store = SqliteStore::in_memory().unwrap();
        let chapters = subjects().doc("s").collection("chapters");
        for name in ["c", "a", "b"] {
            store.create(&chapters, json!({"name": name})).unwrap();
        }
        store.create(&subjects(), json!({"name": "other"})).unwrap();

        let names: Vec<_> = store
            .list(&chapters)
            .unwrap()
            .into_iter()
            .map(|d| d.data["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_adjust_counter_saturates() {
        let store = SqliteStore::in_memory().unwrap();
        let doc = store.create(&subjects(), json!({"name": "Maths"})).unwrap();

        assert_eq!(store.adjust_counter(&doc, "totalTime", 20).unwrap(), 20);
        assert_eq!(store.adjust_counter(&doc, "totalTime", 30).unwrap(), 50);
        assert_eq!(store.adjust_counter(&doc, "totalTime", -80).unwrap(), 0);

        let loaded = store.get(&doc).unwrap().unwrap();
        assert_eq!(loaded.data["totalTime"], 0);
        assert_eq!(loaded.data["name"], "Maths");
    }

    #[test]
    fn test_adjust_counter_missing_doc() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.adjust_counter(&subjects().doc("x"), "totalTime", 1).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_concurrent_adjustments_do_not_lose_updates() {
        let store = std::sync::Arc::new(SqliteStore::in_memory().unwrap());
        let doc = store.create(&subjects(), json!({})).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let doc = doc.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.adjust_counter(&doc, "totalTime", 2).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.get(&doc).unwrap().unwrap();
        assert_eq!(loaded.data["totalTime"], 400);
    }

    #[test]
    fn test_writes_are_announced() {
        let store = SqliteStore::in_memory().unwrap();
        let mut rx = store.changes();
        let doc = store.create(&subjects(), json!({})).unwrap();
        store.delete(&doc).unwrap();

        assert_eq!(rx.try_recv().unwrap(), subjects());
        assert_eq!(rx.try_recv().unwrap(), subjects());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let doc = {
            let store = SqliteStore::open(&path).unwrap();
            store.create(&subjects(), json!({"name": "Kept"})).unwrap()
        };
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(&doc).unwrap().unwrap().data["name"], "Kept");
    }
}
