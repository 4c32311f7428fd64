//! Catalog operations over the entity and blob stores.

use crate::aggregate::Aggregator;
use crate::blob::{BlobError, BlobStore, Upload, UploadProgress};
use crate::cascade::{CascadeDeleter, CascadeReport};
use crate::feed::Snapshots;
use crate::models::{
    sort_by_position, Answer, Chapter, Content, ContentType, Entity, Level, Question, Subject,
    Syllabus, Term, Tutor,
};
use crate::path::{roots_collection, terms_collection, ChapterParent, CollectionPath, PathError};
use crate::store::{Document, EntityStore, StoreError};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    /// Validation problems are the user's to fix; everything else is remote.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Everything needed to create a subject or course.
#[derive(Debug, Clone, Default)]
pub struct NewSubject {
    pub name: String,
    pub category: String,
    pub image: Option<Upload>,
    pub tutor_name: String,
    pub tutor_image: Option<Upload>,
    pub description: String,
    pub syllabus_name: String,
    pub syllabus_document: Option<Upload>,
}

impl NewSubject {
    fn validate(&self) -> CatalogResult<()> {
        let missing: Vec<&str> = [
            ("name", self.name.trim().is_empty()),
            ("category", self.category.trim().is_empty()),
            ("image", self.image.is_none()),
            ("tutor name", self.tutor_name.trim().is_empty()),
            ("tutor image", self.tutor_image.is_none()),
            ("description", self.description.trim().is_empty()),
            ("syllabus name", self.syllabus_name.trim().is_empty()),
            ("syllabus document", self.syllabus_document.is_none()),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(field, _)| field)
        .collect();
        require_all(&missing)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubjectEdit {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewChapter {
    pub name: String,
    pub position: i64,
    pub week: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAnswer {
    pub text: String,
    pub image: Option<Upload>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub text: String,
    pub image: Option<Upload>,
    pub answers: Vec<NewAnswer>,
}

#[derive(Debug, Clone)]
pub enum NewContentKind {
    Pdf(Option<Upload>),
    Video(Option<Upload>),
    Exercise(Vec<NewQuestion>),
}

impl NewContentKind {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Pdf(_) => ContentType::Pdf,
            Self::Video(_) => ContentType::Video,
            Self::Exercise(_) => ContentType::Exercise,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub topic_name: String,
    pub timeframe: String,
    pub position: Option<i64>,
    pub kind: NewContentKind,
}

impl NewContent {
    fn validate(&self) -> CatalogResult<()> {
        let mut missing = Vec::new();
        if self.topic_name.trim().is_empty() {
            missing.push("topic name");
        }
        if self.timeframe.trim().is_empty() {
            missing.push("timeframe");
        }
        if self.position.is_none() {
            missing.push("position");
        }
        if let NewContentKind::Pdf(None) | NewContentKind::Video(None) = self.kind {
            missing.push("file");
        }
        require_all(&missing)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentEdit {
    pub topic_name: String,
    pub position: i64,
}

/// What a media viewer needs to open a content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub content_type: ContentType,
    pub url: String,
}

fn require_all(missing: &[&str]) -> CatalogResult<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CatalogError::Validation(format!(
            "Please fill in all fields: {}",
            missing.join(", ")
        )))
    }
}

/// Entry point for reading and changing the catalog tree.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn EntityStore>,
    blobs: Arc<dyn BlobStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn EntityStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    // Subjects and courses

    /// Upload the assets, write the entry, then its six terms when the level
    /// has terms. The sequence is not atomic.
    pub fn create_root(
        &self,
        level: Level,
        new: NewSubject,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> CatalogResult<Subject> {
        new.validate()?;
        let (Some(image), Some(tutor_image), Some(syllabus_document)) =
            (&new.image, &new.tutor_image, &new.syllabus_document)
        else {
            return Err(CatalogError::Validation("Please fill in all fields".into()));
        };

        let stamp = Utc::now().timestamp_millis();
        let image_url = self.blobs.upload(
            &format!("subject_images/{}_{stamp}", storage_name(&new.name)),
            &image.bytes,
            progress,
        )?;
        let tutor_image_url = self.blobs.upload(
            &format!("tutor_images/{}_{stamp}", storage_name(&new.tutor_name)),
            &tutor_image.bytes,
            progress,
        )?;
        let syllabus_url = self.blobs.upload(
            &format!("syllabus_documents/{}_{stamp}", storage_name(&new.syllabus_name)),
            &syllabus_document.bytes,
            progress,
        )?;

        let mut subject = Subject {
            id: String::new(),
            name: new.name.trim().to_string(),
            category: new.category.trim().to_string(),
            image_url,
            tutor: Tutor {
                name: new.tutor_name.trim().to_string(),
                image: tutor_image_url,
            },
            description: new.description,
            syllabus: Syllabus {
                name: new.syllabus_name.trim().to_string(),
                document: syllabus_url,
            },
            total_time: 0,
            level_kind: level,
        };
        let doc = self
            .store
            .create(&roots_collection(level), serde_json::to_value(&subject)?)?;
        subject.id = doc.id().to_string();

        if level.has_terms() {
            for term in Term::standard_set(&subject.id) {
                self.store
                    .create(&terms_collection(&subject.id), serde_json::to_value(&term)?)?;
            }
        }

        tracing::info!(id = %subject.id, %level, name = %subject.name, "created {}", level.root_noun());
        Ok(subject)
    }

    pub fn list_roots(&self, level: Level) -> CatalogResult<Vec<Subject>> {
        let mut roots: Vec<Subject> = decode_all(self.store.list(&roots_collection(level))?);
        if level.has_terms() {
            roots.retain(|s| s.level_kind == level);
        }
        Ok(roots)
    }

    pub fn get_root(&self, level: Level, id: &str) -> CatalogResult<Option<Subject>> {
        self.get_decoded(&roots_collection(level), id)
    }

    pub fn update_root(&self, level: Level, id: &str, edit: SubjectEdit) -> CatalogResult<()> {
        let mut missing = Vec::new();
        if edit.name.trim().is_empty() {
            missing.push("name");
        }
        if edit.category.trim().is_empty() {
            missing.push("category");
        }
        require_all(&missing)?;

        self.store.update(
            &roots_collection(level).doc(id),
            json!({"name": edit.name.trim(), "category": edit.category.trim()}),
        )?;
        Ok(())
    }

    pub fn delete_root(&self, level: Level, id: &str) -> CatalogResult<Option<CascadeReport>> {
        Ok(self.deleter().delete_root(level, id)?)
    }

    // Terms

    /// Terms of a subject ordered by term number.
    pub fn list_terms(&self, subject_id: &str) -> CatalogResult<Vec<Term>> {
        let mut terms: Vec<Term> = decode_all(self.store.list(&terms_collection(subject_id))?);
        terms.sort_by_key(|t| t.term_number);
        Ok(terms)
    }

    pub fn get_term(&self, subject_id: &str, term_id: &str) -> CatalogResult<Option<Term>> {
        self.get_decoded(&terms_collection(subject_id), term_id)
    }

    // Chapters

    pub fn create_chapter(&self, parent: &ChapterParent, new: NewChapter) -> CatalogResult<Chapter> {
        if new.name.trim().is_empty() {
            require_all(&["name"])?;
        }
        self.require_parent(parent)?;

        let mut chapter = Chapter {
            id: String::new(),
            name: new.name.trim().to_string(),
            position: new.position,
            week: new.week.filter(|w| !w.trim().is_empty()),
        };
        let doc = self
            .store
            .create(&parent.chapters(), serde_json::to_value(&chapter)?)?;
        chapter.id = doc.id().to_string();
        tracing::info!(path = %doc, "created chapter");
        Ok(chapter)
    }

    /// Chapters in display order.
    pub fn list_chapters(&self, parent: &ChapterParent) -> CatalogResult<Vec<Chapter>> {
        let mut chapters: Vec<Chapter> = decode_all(self.store.list(&parent.chapters())?);
        sort_by_position(&mut chapters);
        Ok(chapters)
    }

    pub fn get_chapter(&self, parent: &ChapterParent, chapter_id: &str) -> CatalogResult<Option<Chapter>> {
        self.get_decoded(&parent.chapters(), chapter_id)
    }

    pub fn delete_chapter(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
    ) -> CatalogResult<Option<CascadeReport>> {
        Ok(self.deleter().delete_chapter(parent, chapter_id)?)
    }

    // Contents

    /// Upload any files, write the item, then add its minutes to the total.
    pub fn create_content(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
        new: NewContent,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> CatalogResult<Content> {
        new.validate()?;
        if self.store.get(&parent.chapter(chapter_id))?.is_none() {
            return Err(CatalogError::NotFound(parent.chapter(chapter_id).to_string()));
        }

        let content_type = new.kind.content_type();
        let (content_url, questions) = match new.kind {
            NewContentKind::Pdf(Some(file)) | NewContentKind::Video(Some(file)) => {
                let path = format!("contents/{}_{}", short_id(), storage_name(&file.file_name));
                (self.blobs.upload(&path, &file.bytes, progress)?, Vec::new())
            }
            NewContentKind::Pdf(None) | NewContentKind::Video(None) => {
                return Err(CatalogError::Validation("Please select a file to upload".into()));
            }
            NewContentKind::Exercise(questions) => {
                let questions = self.upload_questions(questions, progress)?;
                (Uuid::new_v4().simple().to_string(), questions)
            }
        };

        let mut content = Content {
            id: String::new(),
            topic_name: new.topic_name.trim().to_string(),
            content_type,
            timeframe: new.timeframe.trim().to_string(),
            position: new.position.unwrap_or_default(),
            content_url: Some(content_url),
            chapter_id: Some(chapter_id.to_string()),
            questions,
        };
        let doc = self
            .store
            .create(&parent.contents(chapter_id), serde_json::to_value(&content)?)?;
        content.id = doc.id().to_string();

        let total = Aggregator::new(self.store.as_ref())
            .record_created(&parent.timing_owner(), &content.timeframe)?;
        tracing::info!(path = %doc, content_type = content_type.name(), total, "created content");
        Ok(content)
    }

    fn upload_questions(
        &self,
        questions: Vec<NewQuestion>,
        progress: &mut dyn FnMut(UploadProgress),
    ) -> CatalogResult<Vec<Question>> {
        let mut uploaded = Vec::with_capacity(questions.len());
        for question in questions {
            let image = match &question.image {
                Some(file) => Some(self.blobs.upload(&image_path("questions"), &file.bytes, progress)?),
                None => None,
            };
            let mut answers = Vec::with_capacity(question.answers.len());
            for answer in question.answers {
                let image = match &answer.image {
                    Some(file) => Some(self.blobs.upload(&image_path("answers"), &file.bytes, progress)?),
                    None => None,
                };
                answers.push(Answer {
                    text: answer.text,
                    image,
                    is_correct: answer.is_correct,
                });
            }
            uploaded.push(Question {
                question_text: question.text,
                image,
                answers,
            });
        }
        Ok(uploaded)
    }

    /// Contents of a chapter in display order.
    pub fn list_contents(&self, parent: &ChapterParent, chapter_id: &str) -> CatalogResult<Vec<Content>> {
        let mut contents: Vec<Content> = decode_all(self.store.list(&parent.contents(chapter_id))?);
        sort_by_position(&mut contents);
        Ok(contents)
    }

    pub fn get_content(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
        content_id: &str,
    ) -> CatalogResult<Option<Content>> {
        self.get_decoded(&parent.contents(chapter_id), content_id)
    }

    pub fn update_content(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
        content_id: &str,
        edit: ContentEdit,
    ) -> CatalogResult<()> {
        if edit.topic_name.trim().is_empty() {
            return require_all(&["topic name"]);
        }
        self.store.update(
            &parent.content(chapter_id, content_id),
            json!({"topicName": edit.topic_name.trim(), "position": edit.position}),
        )?;
        Ok(())
    }

    pub fn delete_content(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
        content_id: &str,
    ) -> CatalogResult<Option<CascadeReport>> {
        Ok(self.deleter().delete_content(parent, chapter_id, content_id)?)
    }

    /// Viewer hand-off for pdf and video items.
    pub fn media_request(content: &Content) -> Option<MediaRequest> {
        if !content.content_type.is_media() {
            return None;
        }
        content.content_url.as_ref().map(|url| MediaRequest {
            content_type: content.content_type,
            url: url.clone(),
        })
    }

    // Aggregates and feeds

    pub fn total_time(&self, parent: &ChapterParent) -> CatalogResult<i64> {
        Ok(Aggregator::new(self.store.as_ref()).total(&parent.timing_owner())?)
    }

    pub fn rebuild_total(&self, parent: &ChapterParent) -> CatalogResult<i64> {
        self.require_parent(parent)?;
        Ok(Aggregator::new(self.store.as_ref()).rebuild(parent)?)
    }

    pub fn subscribe(&self, collection: CollectionPath) -> Snapshots {
        Snapshots::new(self.store.clone(), collection)
    }

    fn deleter(&self) -> CascadeDeleter<'_> {
        CascadeDeleter::new(self.store.as_ref(), self.blobs.as_ref())
    }

    fn require_parent(&self, parent: &ChapterParent) -> CatalogResult<()> {
        match self.store.get(&parent.doc())? {
            Some(_) => Ok(()),
            None => Err(CatalogError::NotFound(parent.doc().to_string())),
        }
    }

    fn get_decoded<T: DeserializeOwned + Entity>(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> CatalogResult<Option<T>> {
        match self.store.get(&collection.doc(id))? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}

/// Decode a snapshot, skipping documents that no longer fit the model.
pub fn decode_all<T: DeserializeOwned + Entity>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode() {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(path = %doc.path, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// Storage paths keep names readable but never nest.
fn storage_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Exercise images: upload time plus a short random suffix.
fn image_path(folder: &str) -> String {
    format!("{folder}/{}_{}", Utc::now().timestamp_millis(), short_id())
}
