//! # content-tree
//!
//! The subject → term → chapter → content hierarchy behind the course catalog.
//!
//! ## Features
//!
//! - Two hierarchy shapes: term-based subjects (Primary, High School) and
//!   term-less courses (Tertiary)
//! - Path resolution from explicit level and identifiers
//! - `totalTime` aggregate maintained through an atomic counter primitive
//! - Cascading deletes that remove every blob a node owns
//! - SQLite document store with a snapshot change feed
//! - Filesystem and in-memory blob stores

mod aggregate;
mod blob;
mod cascade;
mod catalog;
mod duration;
mod feed;
mod models;
mod path;
mod store;

pub use aggregate::Aggregator;
pub use blob::{BlobError, BlobResult, BlobStore, FsBlobStore, MemoryBlobStore, Upload, UploadProgress};
pub use cascade::{CascadeDeleter, CascadeReport};
pub use catalog::{
    decode_all, Catalog, CatalogError, CatalogResult, ContentEdit, MediaRequest, NewAnswer, NewChapter,
    NewContent, NewContentKind, NewQuestion, NewSubject, SubjectEdit,
};
pub use duration::parse_minutes;
pub use feed::{SnapshotDiff, Snapshots};
pub use models::{
    sort_by_position, Answer, Chapter, Content, ContentType, Entity, Level, Positioned, Question,
    Subject, Syllabus, Term, Tutor, TERMS_PER_SUBJECT,
};
pub use path::{roots_collection, terms_collection, ChapterParent, CollectionPath, DocPath, PathError};
pub use store::{Document, EntityStore, SqliteStore, StoreError, StoreResult};
