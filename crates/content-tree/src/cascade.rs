//! Deleting nodes together with every blob they own.
//!
//! Deletion is best-effort: a blob that fails to delete is logged and
//! reported, the remaining deletions still run, and nothing already removed
//! is restored. A document that no longer decodes is still removed. Store
//! failures propagate.

use crate::aggregate::Aggregator;
use crate::blob::BlobStore;
use crate::duration::parse_minutes;
use crate::models::{Content, Level, Subject};
use crate::path::{roots_collection, terms_collection, ChapterParent};
use crate::store::{EntityStore, StoreResult};
use serde_json::Value;

/// What a cascade removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub documents_deleted: usize,
    pub blobs_deleted: usize,
    /// URLs that could not be deleted and are now orphaned.
    pub blob_failures: Vec<String>,
    pub minutes_released: u32,
}

impl CascadeReport {
    fn absorb(&mut self, other: CascadeReport) {
        self.documents_deleted += other.documents_deleted;
        self.blobs_deleted += other.blobs_deleted;
        self.blob_failures.extend(other.blob_failures);
        self.minutes_released = self.minutes_released.saturating_add(other.minutes_released);
    }

    pub fn is_clean(&self) -> bool {
        self.blob_failures.is_empty()
    }
}

pub struct CascadeDeleter<'a> {
    store: &'a dyn EntityStore,
    blobs: &'a dyn BlobStore,
}

impl<'a> CascadeDeleter<'a> {
    pub fn new(store: &'a dyn EntityStore, blobs: &'a dyn BlobStore) -> Self {
        Self { store, blobs }
    }

    /// Delete a content item, its blobs, and its minutes from the aggregate.
    ///
    /// `None` when the item no longer exists.
    pub fn delete_content(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
        content_id: &str,
    ) -> StoreResult<Option<CascadeReport>> {
        let doc = parent.content(chapter_id, content_id);
        let Some(found) = self.store.get(&doc)? else {
            tracing::warn!(path = %doc, "content already gone, nothing to delete");
            return Ok(None);
        };
        let (timeframe, blobs) = match found.decode::<Content>() {
            Ok(content) => {
                let blobs: Vec<String> = content.owned_blobs().into_iter().map(str::to_string).collect();
                (content.timeframe, blobs)
            }
            Err(e) => {
                tracing::warn!(path = %doc, error = %e, "malformed content, deleting without its blobs");
                (raw_text(&found.data, "/timeframe"), Vec::new())
            }
        };

        self.store.delete(&doc)?;
        let mut report = CascadeReport {
            documents_deleted: 1,
            ..Default::default()
        };

        for url in &blobs {
            self.delete_blob(url, &mut report);
        }

        Aggregator::new(self.store).record_deleted(&parent.timing_owner(), &timeframe)?;
        report.minutes_released = parse_minutes(&timeframe);

        tracing::info!(
            path = %doc,
            blobs = report.blobs_deleted,
            failures = report.blob_failures.len(),
            "deleted content"
        );
        Ok(Some(report))
    }

    /// Delete a chapter after cascading over its contents.
    pub fn delete_chapter(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
    ) -> StoreResult<Option<CascadeReport>> {
        let doc = parent.chapter(chapter_id);
        if self.store.get(&doc)?.is_none() {
            tracing::warn!(path = %doc, "chapter already gone, nothing to delete");
            return Ok(None);
        }

        let mut report = CascadeReport::default();
        for content in self.store.list(&parent.contents(chapter_id))? {
            if let Some(removed) = self.delete_content(parent, chapter_id, content.id())? {
                report.absorb(removed);
            }
        }

        if self.store.delete(&doc)? {
            report.documents_deleted += 1;
        }
        tracing::info!(path = %doc, documents = report.documents_deleted, "deleted chapter");
        Ok(Some(report))
    }

    /// Delete a subject or course with its whole subtree and assets.
    pub fn delete_root(&self, level: Level, root_id: &str) -> StoreResult<Option<CascadeReport>> {
        let doc = roots_collection(level).doc(root_id);
        let Some(found) = self.store.get(&doc)? else {
            tracing::warn!(path = %doc, "{} already gone, nothing to delete", level.root_noun());
            return Ok(None);
        };
        let assets: Vec<String> = match found.decode::<Subject>() {
            Ok(subject) => vec![subject.image_url, subject.tutor.image, subject.syllabus.document],
            Err(e) => {
                tracing::warn!(path = %doc, error = %e, "malformed {}, reading assets raw", level.root_noun());
                ["/imageUrl", "/tutor/image", "/syllabus/document"]
                    .iter()
                    .map(|pointer| raw_text(&found.data, pointer))
                    .collect()
            }
        };

        let mut report = CascadeReport::default();
        if level.has_terms() {
            for term in self.store.list(&terms_collection(root_id))? {
                let parent = ChapterParent::Term {
                    subject_id: root_id.to_string(),
                    term_id: term.id().to_string(),
                };
                self.delete_chapters_of(&parent, &mut report)?;
                if self.store.delete(&term.path)? {
                    report.documents_deleted += 1;
                }
            }
        } else {
            let parent = ChapterParent::Course {
                course_id: root_id.to_string(),
            };
            self.delete_chapters_of(&parent, &mut report)?;
        }

        for url in assets.iter().filter(|url| !url.is_empty()) {
            self.delete_blob(url, &mut report);
        }

        if self.store.delete(&doc)? {
            report.documents_deleted += 1;
        }
        tracing::info!(path = %doc, documents = report.documents_deleted, "deleted {}", level.root_noun());
        Ok(Some(report))
    }

    fn delete_chapters_of(&self, parent: &ChapterParent, report: &mut CascadeReport) -> StoreResult<()> {
        for chapter in self.store.list(&parent.chapters())? {
            if let Some(removed) = self.delete_chapter(parent, chapter.id())? {
                report.absorb(removed);
            }
        }
        Ok(())
    }

    fn delete_blob(&self, url: &str, report: &mut CascadeReport) {
        match self.blobs.delete(url) {
            Ok(()) => report.blobs_deleted += 1,
            Err(e) => {
                tracing::error!(url, error = %e, "failed to delete blob");
                report.blob_failures.push(url.to_string());
            }
        }
    }
}

/// A string or number field read without decoding the whole document.
fn raw_text(data: &Value, pointer: &str) -> String {
    match data.pointer(pointer) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobError, BlobResult, MemoryBlobStore, UploadProgress};
    use crate::path::{CollectionPath, DocPath};
    use crate::store::{Document, SqliteStore};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    /// Counts document deletes on top of a real store.
    struct CountingStore {
        inner: SqliteStore,
        deletes: AtomicUsize,
    }

    impl EntityStore for CountingStore {
        fn create(&self, collection: &CollectionPath, data: Value) -> StoreResult<DocPath> {
            self.inner.create(collection, data)
        }
        fn get(&self, doc: &DocPath) -> StoreResult<Option<Document>> {
            self.inner.get(doc)
        }
        fn update(&self, doc: &DocPath, fields: Value) -> StoreResult<()> {
            self.inner.update(doc, fields)
        }
        fn delete(&self, doc: &DocPath) -> StoreResult<bool> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(doc)
        }
        fn list(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>> {
            self.inner.list(collection)
        }
        fn adjust_counter(&self, doc: &DocPath, field: &str, delta: i64) -> StoreResult<i64> {
            self.inner.adjust_counter(doc, field, delta)
        }
        fn changes(&self) -> broadcast::Receiver<CollectionPath> {
            self.inner.changes()
        }
    }

    /// Refuses to delete one URL.
    struct FlakyBlobs {
        inner: MemoryBlobStore,
        refuse: String,
    }

    impl BlobStore for FlakyBlobs {
        fn upload(
            &self,
            path: &str,
            bytes: &[u8],
            progress: &mut dyn FnMut(UploadProgress),
        ) -> BlobResult<String> {
            self.inner.upload(path, bytes, progress)
        }
        fn delete(&self, url: &str) -> BlobResult<()> {
            if url == self.refuse {
                return Err(BlobError::Io(std::io::Error::other("storage unavailable")));
            }
            self.inner.delete(url)
        }
    }

    fn put(blobs: &dyn BlobStore, path: &str) -> String {
        blobs.upload(path, b"img", &mut |_| {}).unwrap()
    }

    fn course_with_chapter(store: &dyn EntityStore) -> (ChapterParent, String) {
        let course = store
            .create(&CollectionPath::root("courses"), json!({"name": "Physics", "totalTime": 0}))
            .unwrap();
        let parent = ChapterParent::Course {
            course_id: course.id().to_string(),
        };
        let chapter = store.create(&parent.chapters(), json!({"name": "Motion"})).unwrap();
        (parent, chapter.id().to_string())
    }

    fn exercise(blobs: &dyn BlobStore) -> Value {
        let questions: Vec<Value> = (0..2)
            .map(|q| {
                json!({
                    "questionText": format!("Q{q}"),
                    "image": put(blobs, &format!("questions/{q}")),
                    "answers": [
                        {"text": "yes", "image": put(blobs, &format!("answers/{q}")), "isCorrect": true},
                        {"text": "no", "isCorrect": false}
                    ]
                })
            })
            .collect();
        json!({
            "topicName": "Quiz",
            "contentType": "exercise",
            "timeframe": "15 mins",
            "position": 1,
            "contentUrl": "a1b2c3",
            "questions": questions
        })
    }

    #[test]
    fn test_exercise_cascade_is_complete() {
        let store = CountingStore {
            inner: SqliteStore::in_memory().unwrap(),
            deletes: AtomicUsize::new(0),
        };
        let blobs = MemoryBlobStore::new();
        let (parent, chapter) = course_with_chapter(&store);
        let content = store.create(&parent.contents(&chapter), exercise(&blobs)).unwrap();
        store.adjust_counter(&parent.timing_owner(), "totalTime", 15).unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_content(&parent, &chapter, content.id())
            .unwrap()
            .unwrap();

        let deleted = blobs.deleted();
        assert_eq!(deleted.iter().filter(|u| u.contains("questions/")).count(), 2);
        assert_eq!(deleted.iter().filter(|u| u.contains("answers/")).count(), 2);
        assert_eq!(deleted.len(), 4);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(report.documents_deleted, 1);
        assert_eq!(report.blobs_deleted, 4);
        assert_eq!(report.minutes_released, 15);
        assert!(blobs.is_empty());
        assert_eq!(Aggregator::new(&store).total(&parent.timing_owner()).unwrap(), 0);
    }

    #[test]
    fn test_media_cascade_deletes_file() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let (parent, chapter) = course_with_chapter(&store);
        let url = put(&blobs, "contents/intro.mp4");
        let content = store
            .create(
                &parent.contents(&chapter),
                json!({"topicName": "Intro", "contentType": "video", "timeframe": "40", "position": 1, "contentUrl": url}),
            )
            .unwrap();
        store.adjust_counter(&parent.timing_owner(), "totalTime", 30).unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_content(&parent, &chapter, content.id())
            .unwrap()
            .unwrap();

        assert_eq!(blobs.deleted(), vec![url]);
        assert!(report.is_clean());
        // Source was already inconsistent; the floor holds.
        assert_eq!(Aggregator::new(&store).total(&parent.timing_owner()).unwrap(), 0);
    }

    #[test]
    fn test_missing_content_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let (parent, chapter) = course_with_chapter(&store);

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_content(&parent, &chapter, "gone")
            .unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_blob_failure_does_not_stop_cascade() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = FlakyBlobs {
            inner: MemoryBlobStore::new(),
            refuse: "mem://questions/0".to_string(),
        };
        let (parent, chapter) = course_with_chapter(&store);
        let content = store.create(&parent.contents(&chapter), exercise(&blobs)).unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_content(&parent, &chapter, content.id())
            .unwrap()
            .unwrap();

        assert_eq!(report.blob_failures, vec!["mem://questions/0".to_string()]);
        assert_eq!(report.blobs_deleted, 3);
        assert!(store.get(&parent.content(&chapter, content.id())).unwrap().is_none());
        assert!(blobs.inner.contains("mem://questions/0"));
    }

    #[test]
    fn test_delete_chapter_cascades() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let (parent, chapter) = course_with_chapter(&store);
        for (name, minutes) in [("a.pdf", "10"), ("b.pdf", "20")] {
            let url = put(&blobs, &format!("contents/{name}"));
            store
                .create(
                    &parent.contents(&chapter),
                    json!({"topicName": name, "contentType": "pdf", "timeframe": minutes, "position": 1, "contentUrl": url}),
                )
                .unwrap();
            store.adjust_counter(&parent.timing_owner(), "totalTime", minutes.parse().unwrap()).unwrap();
        }

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_chapter(&parent, &chapter)
            .unwrap()
            .unwrap();

        assert_eq!(report.documents_deleted, 3);
        assert_eq!(report.minutes_released, 30);
        assert!(blobs.is_empty());
        assert!(store.list(&parent.chapters()).unwrap().is_empty());
        assert_eq!(Aggregator::new(&store).total(&parent.timing_owner()).unwrap(), 0);
    }

    #[test]
    fn test_delete_subject_removes_terms_and_assets() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let image = put(&blobs, "subject_images/maths_1");
        let subject = store
            .create(
                &roots_collection(Level::Primary),
                json!({"name": "Maths", "imageUrl": image, "levelKind": "Primary"}),
            )
            .unwrap();
        let term = store
            .create(&terms_collection(subject.id()), json!({"termNumber": 1}))
            .unwrap();
        let parent = ChapterParent::Term {
            subject_id: subject.id().to_string(),
            term_id: term.id().to_string(),
        };
        let chapter = store.create(&parent.chapters(), json!({"name": "Sets"})).unwrap();
        store
            .create(&parent.contents(chapter.id()), exercise(&blobs))
            .unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_root(Level::Primary, subject.id())
            .unwrap()
            .unwrap();

        // content, chapter, term, subject
        assert_eq!(report.documents_deleted, 4);
        assert_eq!(report.blobs_deleted, 5);
        assert!(blobs.is_empty());
        assert!(store.get(&subject).unwrap().is_none());
        assert!(store.list(&terms_collection(subject.id())).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_content_is_still_deleted() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let (parent, chapter) = course_with_chapter(&store);
        let content = store
            .create(
                &parent.contents(&chapter),
                json!({"topicName": "Podcast", "contentType": "audio", "timeframe": "12 mins", "position": 1}),
            )
            .unwrap();
        store.adjust_counter(&parent.timing_owner(), "totalTime", 20).unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_content(&parent, &chapter, content.id())
            .unwrap()
            .unwrap();

        assert_eq!(report.documents_deleted, 1);
        assert_eq!(report.minutes_released, 12);
        assert!(store.get(&content).unwrap().is_none());
        assert_eq!(Aggregator::new(&store).total(&parent.timing_owner()).unwrap(), 8);
    }

    #[test]
    fn test_malformed_content_does_not_block_chapter_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let (parent, chapter) = course_with_chapter(&store);
        store
            .create(
                &parent.contents(&chapter),
                json!({"topicName": "Podcast", "contentType": "audio", "timeframe": 5}),
            )
            .unwrap();
        let url = put(&blobs, "contents/notes.pdf");
        store
            .create(
                &parent.contents(&chapter),
                json!({"topicName": "Notes", "contentType": "pdf", "timeframe": "10", "position": 2, "contentUrl": url}),
            )
            .unwrap();
        store.adjust_counter(&parent.timing_owner(), "totalTime", 15).unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_chapter(&parent, &chapter)
            .unwrap()
            .unwrap();

        assert_eq!(report.documents_deleted, 3);
        assert_eq!(report.minutes_released, 15);
        assert!(blobs.is_empty());
        assert!(store.list(&parent.contents(&chapter)).unwrap().is_empty());
        assert!(store.list(&parent.chapters()).unwrap().is_empty());
        assert_eq!(Aggregator::new(&store).total(&parent.timing_owner()).unwrap(), 0);
    }

    #[test]
    fn test_malformed_subject_still_releases_assets() {
        let store = SqliteStore::in_memory().unwrap();
        let blobs = MemoryBlobStore::new();
        let image = put(&blobs, "subject_images/art_1");
        let subject = store
            .create(
                &roots_collection(Level::Primary),
                json!({"name": "Art", "imageUrl": image, "levelKind": "Kindergarten"}),
            )
            .unwrap();

        let report = CascadeDeleter::new(&store, &blobs)
            .delete_root(Level::Primary, subject.id())
            .unwrap()
            .unwrap();

        assert_eq!(report.documents_deleted, 1);
        assert_eq!(blobs.deleted(), vec![image]);
        assert!(store.get(&subject).unwrap().is_none());
    }
}
