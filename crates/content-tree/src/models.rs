//! Data models for the catalog tree.
//!
//! Field names follow the persisted camelCase document shape. Decoding is
//! lenient where older documents were written loosely: positions may be
//! numeric strings, and question/answer lists may be stored as keyed maps.

use crate::duration::parse_minutes;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of terms created with every term-based subject.
pub const TERMS_PER_SUBJECT: u32 = 6;

/// Education level; selects the hierarchy shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Level {
    #[default]
    Primary,
    #[serde(rename = "High School", alias = "HighSchool")]
    HighSchool,
    Tertiary,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Primary, Level::HighSchool, Level::Tertiary];

    /// Get display name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::HighSchool => "High School",
            Self::Tertiary => "Tertiary",
        }
    }

    /// Whether chapters sit under terms.
    pub fn has_terms(&self) -> bool {
        !matches!(self, Self::Tertiary)
    }

    /// Top-level collection for this level.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Primary | Self::HighSchool => "subjects",
            Self::Tertiary => "courses",
        }
    }

    /// What a top-level entry is called at this level.
    pub fn root_noun(&self) -> &'static str {
        match self {
            Self::Tertiary => "Course",
            _ => "Subject",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Models that take their id from the document path.
pub trait Entity {
    fn set_id(&mut self, id: String);
}

/// Models ordered by a `position` field.
pub trait Positioned {
    fn position(&self) -> i64;
}

/// Stable sort by position; equal positions keep their arrival order.
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| item.position());
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tutor {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Syllabus {
    pub name: String,
    pub document: String,
}

/// A subject (Primary, High School) or course (Tertiary).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subject {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(alias = "subjectImageUrl")]
    pub image_url: String,
    pub tutor: Tutor,
    pub description: String,
    pub syllabus: Syllabus,
    /// Only meaningful on courses; subjects aggregate per term.
    pub total_time: i64,
    pub level_kind: Level,
}

impl Entity for Subject {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// One of the six fixed terms of a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Term {
    #[serde(skip)]
    pub id: String,
    pub term_number: u32,
    pub form: u32,
    pub term: u32,
    pub name: String,
    pub subject_id: String,
    pub total_time: i64,
}

impl Term {
    /// The six terms of a subject: form 5 terms 1–3, then form 6 terms 1–3.
    pub fn standard_set(subject_id: &str) -> Vec<Term> {
        (1..=TERMS_PER_SUBJECT)
            .map(|term_number| {
                let form = if term_number <= 3 { 5 } else { 6 };
                let term = (term_number - 1) % 3 + 1;
                Term {
                    id: String::new(),
                    term_number,
                    form,
                    term,
                    name: format!("Form {form} Term {term}"),
                    subject_id: subject_id.to_string(),
                    total_time: 0,
                }
            })
            .collect()
    }
}

impl Entity for Term {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chapter {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "lenient_position")]
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<String>,
}

impl Entity for Chapter {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Positioned for Chapter {
    fn position(&self) -> i64 {
        self.position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Pdf,
    Video,
    Exercise,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Pdf, ContentType::Video, ContentType::Exercise];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Video => "video",
            Self::Exercise => "exercise",
        }
    }

    /// Whether the content is a single uploaded file.
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Pdf | Self::Video)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "video" => Some(Self::Video),
            "exercise" => Some(Self::Exercise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Answer {
    pub text: String,
    pub image: Option<String>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Question {
    pub question_text: String,
    pub image: Option<String>,
    #[serde(deserialize_with = "list_or_map")]
    pub answers: Vec<Answer>,
}

/// A leaf learning item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Content {
    #[serde(skip)]
    pub id: String,
    pub topic_name: String,
    pub content_type: ContentType,
    /// Free-text duration, e.g. "30 mins".
    pub timeframe: String,
    #[serde(deserialize_with = "lenient_position")]
    pub position: i64,
    /// Blob URL for pdf/video, opaque id for exercises.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(deserialize_with = "list_or_map", skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<Question>,
}

impl Content {
    /// Minutes this item contributes to the aggregate.
    pub fn minutes(&self) -> u32 {
        parse_minutes(&self.timeframe)
    }

    /// Every blob URL this item owns.
    pub fn owned_blobs(&self) -> Vec<&str> {
        match self.content_type {
            ContentType::Pdf | ContentType::Video => self.content_url.as_deref().into_iter().collect(),
            ContentType::Exercise => {
                let questions = self.questions.iter().filter_map(|q| q.image.as_deref());
                let answers = self
                    .questions
                    .iter()
                    .flat_map(|q| q.answers.iter())
                    .filter_map(|a| a.image.as_deref());
                questions.chain(answers).collect()
            }
        }
    }
}

impl Entity for Content {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Positioned for Content {
    fn position(&self) -> i64 {
        self.position
    }
}

fn lenient_position<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(n)) => n,
        Some(Raw::Float(f)) => f as i64,
        Some(Raw::Text(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        None => 0,
    })
}

fn list_or_map<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        List(Vec<T>),
        Map(BTreeMap<String, T>),
    }

    Ok(match Option::<Raw<T>>::deserialize(deserializer)? {
        Some(Raw::List(items)) => items,
        Some(Raw::Map(items)) => items.into_values().collect(),
        None => Vec::new(),
    })
}
