//! Collection and document paths, and resolution of where chapters live.

use crate::models::Level;
use std::fmt;
use thiserror::Error;

/// Path of a collection, e.g. `subjects/abc/terms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

/// Path of a single document, e.g. `subjects/abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl CollectionPath {
    /// Top-level collection.
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Document with the given id inside this collection.
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    /// Nested collection under this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    /// Last path segment.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Collection that contains this document.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("{0} subjects need a term to locate chapters")]
    MissingTerm(Level),
}

/// The node chapters hang from: a term of a subject, or a course directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChapterParent {
    Term { subject_id: String, term_id: String },
    Course { course_id: String },
}

impl ChapterParent {
    /// Resolve the chapter parent from an explicit level and identifiers.
    ///
    /// Tertiary ignores `term_id`; the other levels require it.
    pub fn resolve(level: Level, root_id: &str, term_id: Option<&str>) -> Result<Self, PathError> {
        if !level.has_terms() {
            return Ok(Self::Course {
                course_id: root_id.to_string(),
            });
        }
        match term_id {
            Some(term_id) => Ok(Self::Term {
                subject_id: root_id.to_string(),
                term_id: term_id.to_string(),
            }),
            None => Err(PathError::MissingTerm(level)),
        }
    }

    /// Id of the subject or course at the top of the tree.
    pub fn root_id(&self) -> &str {
        match self {
            Self::Term { subject_id, .. } => subject_id,
            Self::Course { course_id } => course_id,
        }
    }

    /// The term or course document.
    pub fn doc(&self) -> DocPath {
        match self {
            Self::Term { subject_id, term_id } => terms_collection(subject_id).doc(term_id),
            Self::Course { course_id } => CollectionPath::root(Level::Tertiary.collection()).doc(course_id),
        }
    }

    /// Document carrying the `totalTime` aggregate.
    pub fn timing_owner(&self) -> DocPath {
        self.doc()
    }

    pub fn chapters(&self) -> CollectionPath {
        self.doc().collection("chapters")
    }

    pub fn chapter(&self, chapter_id: &str) -> DocPath {
        self.chapters().doc(chapter_id)
    }

    pub fn contents(&self, chapter_id: &str) -> CollectionPath {
        self.chapter(chapter_id).collection("contents")
    }

    pub fn content(&self, chapter_id: &str, content_id: &str) -> DocPath {
        self.contents(chapter_id).doc(content_id)
    }
}

/// Collection holding the top-level entries of a level.
pub fn roots_collection(level: Level) -> CollectionPath {
    CollectionPath::root(level.collection())
}

pub fn terms_collection(subject_id: &str) -> CollectionPath {
    roots_collection(Level::Primary).doc(subject_id).collection("terms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tertiary_chapters() {
        let parent = ChapterParent::resolve(Level::Tertiary, "c1", None).unwrap();
        assert_eq!(parent.chapters().as_str(), "courses/c1/chapters");
        assert_eq!(parent.timing_owner().as_str(), "courses/c1");
    }

    #[test]
    fn test_tertiary_ignores_term() {
        let parent = ChapterParent::resolve(Level::Tertiary, "c1", Some("t9")).unwrap();
        assert_eq!(parent, ChapterParent::Course { course_id: "c1".into() });
    }

    #[test]
    fn test_primary_chapters() {
        let parent = ChapterParent::resolve(Level::Primary, "s1", Some("t1")).unwrap();
        assert_eq!(parent.chapters().as_str(), "subjects/s1/terms/t1/chapters");
        assert_eq!(parent.timing_owner().as_str(), "subjects/s1/terms/t1");
    }

    #[test]
    fn test_high_school_requires_term() {
        let err = ChapterParent::resolve(Level::HighSchool, "s1", None).unwrap_err();
        assert_eq!(err, PathError::MissingTerm(Level::HighSchool));
    }

    #[test]
    fn test_content_paths() {
        let parent = ChapterParent::Course { course_id: "c1".into() };
        let doc = parent.content("ch1", "x1");
        assert_eq!(doc.as_str(), "courses/c1/chapters/ch1/contents/x1");
        assert_eq!(doc.id(), "x1");
        assert_eq!(doc.parent(), parent.contents("ch1"));
    }

    #[test]
    fn test_roots() {
        assert_eq!(roots_collection(Level::Primary).as_str(), "subjects");
        assert_eq!(roots_collection(Level::HighSchool).as_str(), "subjects");
        assert_eq!(roots_collection(Level::Tertiary).as_str(), "courses");
        assert_eq!(terms_collection("s1").as_str(), "subjects/s1/terms");
    }
}
