//! Application state and logic.

use crate::config::Config;
use crate::form::{next_position, Form, FormAction, FormKind};
use content_tree::{
    decode_all, roots_collection, sort_by_position, terms_collection, Catalog, CatalogError,
    CatalogResult, Chapter, ChapterParent, CollectionPath, Content, ContentEdit, ContentType,
    Document, Level, MediaRequest, NewAnswer, NewChapter, NewContent, NewContentKind, NewQuestion,
    NewSubject, SnapshotDiff, Snapshots, Subject, SubjectEdit, Term, Upload, UploadProgress,
};
use crossterm::event::{KeyCode, KeyEvent};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One level of the navigation stack. Each screen carries the level and ids
/// its paths are built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Levels,
    Roots {
        level: Level,
    },
    Terms {
        level: Level,
        subject: Subject,
    },
    Chapters {
        level: Level,
        parent: ChapterParent,
        title: String,
    },
    Contents {
        parent: ChapterParent,
        chapter: Chapter,
        title: String,
    },
    Detail {
        parent: ChapterParent,
        chapter_id: String,
        content_id: String,
    },
}

impl Screen {
    pub fn title(&self) -> String {
        match self {
            Self::Levels => "Levels".to_string(),
            Self::Roots { level } => format!("{level} {}s", level.root_noun()),
            Self::Terms { subject, .. } => subject.name.clone(),
            Self::Chapters { title, .. } | Self::Contents { title, .. } => title.clone(),
            Self::Detail { .. } => "Content".to_string(),
        }
    }

    /// Collection whose snapshots drive this screen.
    pub fn collection(&self) -> Option<CollectionPath> {
        match self {
            Self::Levels => None,
            Self::Roots { level } => Some(roots_collection(*level)),
            Self::Terms { subject, .. } => Some(terms_collection(&subject.id)),
            Self::Chapters { parent, .. } => Some(parent.chapters()),
            Self::Contents { parent, chapter, .. } => Some(parent.contents(&chapter.id)),
            Self::Detail { parent, chapter_id, .. } => Some(parent.contents(chapter_id)),
        }
    }

    pub fn parent(&self) -> Option<&ChapterParent> {
        match self {
            Self::Chapters { parent, .. }
            | Self::Contents { parent, .. }
            | Self::Detail { parent, .. } => Some(parent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Root { level: Level, id: String },
    Chapter { parent: ChapterParent, id: String },
    Content { parent: ChapterParent, chapter_id: String, id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirm {
    pub prompt: String,
    pub target: DeleteTarget,
}

/// Question file entry for exercises. Image paths are relative to the file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionEntry {
    text: String,
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default)]
    answers: Vec<AnswerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerEntry {
    text: String,
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default)]
    is_correct: bool,
}

pub struct App {
    pub catalog: Catalog,
    pub config: Config,
    pub stack: Vec<Screen>,
    pub selected_index: usize,
    pub roots: Vec<Subject>,
    pub terms: Vec<Term>,
    pub chapters: Vec<Chapter>,
    pub contents: Vec<Content>,
    pub detail: Option<Content>,
    pub total_time: Option<i64>,
    pub form: Option<Form>,
    pub confirm: Option<Confirm>,
    pub media: Option<MediaRequest>,
    pub message: Option<String>,
    pub show_help: bool,
    feed: Option<Snapshots>,
    snapshot: Vec<Document>,
}

impl App {
    pub fn new(catalog: Catalog, config: Config) -> Self {
        let mut stack = vec![Screen::Levels];
        if let Some(level) = config.display.default_level {
            stack.push(Screen::Roots { level });
        }

        let mut app = Self {
            catalog,
            config,
            stack,
            selected_index: 0,
            roots: Vec::new(),
            terms: Vec::new(),
            chapters: Vec::new(),
            contents: Vec::new(),
            detail: None,
            total_time: None,
            form: None,
            confirm: None,
            media: None,
            message: None,
            show_help: false,
            feed: None,
            snapshot: Vec::new(),
        };
        app.subscribe();
        app
    }

    /// The stack always holds at least the level picker.
    pub fn screen(&self) -> &Screen {
        &self.stack[self.stack.len() - 1]
    }

    pub fn breadcrumb(&self) -> String {
        self.stack
            .iter()
            .map(Screen::title)
            .collect::<Vec<_>>()
            .join(" > ")
    }

    pub fn can_quit(&self) -> bool {
        self.form.is_none() && self.confirm.is_none()
    }

    // Snapshots

    fn subscribe(&mut self) {
        self.snapshot.clear();
        self.feed = self.screen().collection().map(|c| self.catalog.subscribe(c));
        self.poll();
    }

    /// Apply any pending change to the watched collection.
    pub fn poll(&mut self) {
        let result = match self.feed.as_mut() {
            Some(feed) => feed.try_next(),
            None => return,
        };
        match result {
            Ok(Some(docs)) => self.apply_snapshot(docs),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "snapshot feed failed");
                self.message = Some(format!("Live updates stopped: {e}"));
                if let Some(feed) = self.feed.as_mut() {
                    feed.restart();
                }
            }
        }
    }

    fn apply_snapshot(&mut self, docs: Vec<Document>) {
        let diff = SnapshotDiff::between(&self.snapshot, &docs);
        if !diff.is_empty() {
            tracing::debug!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                changed = diff.changed.len(),
                "snapshot changed"
            );
        }
        let selected = self.selected_id();

        match self.screen().clone() {
            Screen::Levels => {}
            Screen::Roots { level } => {
                let mut roots: Vec<Subject> = decode_all(docs.clone());
                if level.has_terms() {
                    roots.retain(|s| s.level_kind == level);
                }
                self.roots = roots;
            }
            Screen::Terms { .. } => {
                let mut terms: Vec<Term> = decode_all(docs.clone());
                terms.sort_by_key(|t| t.term_number);
                self.terms = terms;
            }
            Screen::Chapters { .. } => {
                let mut chapters: Vec<Chapter> = decode_all(docs.clone());
                sort_by_position(&mut chapters);
                self.chapters = chapters;
            }
            Screen::Contents { .. } => {
                let mut contents: Vec<Content> = decode_all(docs.clone());
                sort_by_position(&mut contents);
                self.contents = contents;
            }
            Screen::Detail { content_id, .. } => {
                let had_detail = self.detail.is_some();
                self.detail = decode_all::<Content>(docs.clone())
                    .into_iter()
                    .find(|c| c.id == content_id);
                if had_detail && self.detail.is_none() {
                    self.message = Some("This content was deleted".to_string());
                }
            }
        }

        self.snapshot = docs;
        self.restore_selection(selected);
        self.refresh_total();
    }

    fn refresh_total(&mut self) {
        if !self.config.display.show_totals {
            self.total_time = None;
            return;
        }
        self.total_time = match self.screen().parent() {
            Some(parent) => match self.catalog.total_time(parent) {
                Ok(total) => Some(total),
                Err(e) => {
                    tracing::warn!(error = %e, "could not read total time");
                    None
                }
            },
            None => None,
        };
    }

    // Selection

    pub fn list_len(&self) -> usize {
        match self.screen() {
            Screen::Levels => Level::ALL.len(),
            Screen::Roots { .. } => self.roots.len(),
            Screen::Terms { .. } => self.terms.len(),
            Screen::Chapters { .. } => self.chapters.len(),
            Screen::Contents { .. } => self.contents.len(),
            Screen::Detail { .. } => self.detail.as_ref().map_or(0, |c| c.questions.len()),
        }
    }

    fn selected_id(&self) -> Option<String> {
        let i = self.selected_index;
        match self.screen() {
            Screen::Roots { .. } => self.roots.get(i).map(|s| s.id.clone()),
            Screen::Terms { .. } => self.terms.get(i).map(|t| t.id.clone()),
            Screen::Chapters { .. } => self.chapters.get(i).map(|c| c.id.clone()),
            Screen::Contents { .. } => self.contents.get(i).map(|c| c.id.clone()),
            _ => None,
        }
    }

    /// Keep the cursor on the same item when the list reorders.
    fn restore_selection(&mut self, previous: Option<String>) {
        let found = previous.and_then(|id| match self.screen() {
            Screen::Roots { .. } => self.roots.iter().position(|s| s.id == id),
            Screen::Terms { .. } => self.terms.iter().position(|t| t.id == id),
            Screen::Chapters { .. } => self.chapters.iter().position(|c| c.id == id),
            Screen::Contents { .. } => self.contents.iter().position(|c| c.id == id),
            _ => None,
        });
        if let Some(i) = found {
            self.selected_index = i;
            return;
        }
        let len = self.list_len();
        if self.selected_index >= len {
            self.selected_index = len.saturating_sub(1);
        }
    }

    fn move_selection(&mut self, delta: i32) {
        let len = self.list_len();
        if len == 0 {
            return;
        }
        let new_idx = self.selected_index as i32 + delta;
        self.selected_index = new_idx.clamp(0, len as i32 - 1) as usize;
    }

    // Keys

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.show_help {
            self.show_help = false;
            return;
        }

        if self.form.is_some() {
            self.handle_form_key(key);
            return;
        }

        if let Some(confirm) = self.confirm.take() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.delete(confirm.target),
                _ => self.message = Some("Delete cancelled".to_string()),
            }
            return;
        }

        self.message = None;
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Char('g') => self.selected_index = 0,
            KeyCode::Char('G') => self.selected_index = self.list_len().saturating_sub(1),
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => self.open_selected(),
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('h') | KeyCode::Left => self.back(),
            KeyCode::Char('a') => self.start_add(),
            KeyCode::Char('e') => self.start_edit(),
            KeyCode::Char('d') => self.start_delete(),
            KeyCode::Char('o') => self.open_media(),
            KeyCode::Char('r') => self.rebuild_total(),
            KeyCode::Char('?') => self.show_help = true,
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        match form.handle_key(key) {
            FormAction::Continue => {}
            FormAction::Cancel => self.form = None,
            FormAction::Submit => self.submit_form(),
        }
    }

    // Navigation

    fn push(&mut self, screen: Screen) {
        self.stack.push(screen);
        self.selected_index = 0;
        self.total_time = None;
        self.media = None;
        self.subscribe();
    }

    fn back(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
            self.selected_index = 0;
            self.detail = None;
            self.media = None;
            self.subscribe();
        }
    }

    fn open_selected(&mut self) {
        let i = self.selected_index;
        let next = match self.screen().clone() {
            Screen::Levels => Level::ALL.get(i).map(|level| Ok(Screen::Roots { level: *level })),
            Screen::Roots { level } => self.roots.get(i).cloned().map(|subject| {
                if level.has_terms() {
                    Ok(Screen::Terms { level, subject })
                } else {
                    ChapterParent::resolve(level, &subject.id, None).map(|parent| Screen::Chapters {
                        level,
                        parent,
                        title: subject.name.clone(),
                    })
                }
            }),
            Screen::Terms { level, subject } => self.terms.get(i).map(|term| {
                ChapterParent::resolve(level, &subject.id, Some(&term.id)).map(|parent| {
                    Screen::Chapters {
                        level,
                        parent,
                        title: format!("{} / {}", subject.name, term.name),
                    }
                })
            }),
            Screen::Chapters { parent, title, .. } => self.chapters.get(i).map(|chapter| {
                Ok(Screen::Contents {
                    parent,
                    chapter: chapter.clone(),
                    title: format!("{title} / {}", chapter.name),
                })
            }),
            Screen::Contents { parent, chapter, .. } => self.contents.get(i).map(|content| {
                Ok(Screen::Detail {
                    parent,
                    chapter_id: chapter.id,
                    content_id: content.id.clone(),
                })
            }),
            Screen::Detail { .. } => {
                self.open_media();
                None
            }
        };

        match next {
            Some(Ok(screen)) => self.push(screen),
            Some(Err(e)) => self.report_error("Cannot open", &CatalogError::from(e)),
            None => {}
        }
    }

    fn open_media(&mut self) {
        let content = match self.screen() {
            Screen::Contents { .. } => self.contents.get(self.selected_index),
            Screen::Detail { .. } => self.detail.as_ref(),
            _ => None,
        };
        let Some(content) = content else {
            return;
        };
        match Catalog::media_request(content) {
            Some(request) => {
                tracing::info!(content_type = request.content_type.name(), url = %request.url, "media requested");
                self.message = Some(format!("Open {}: {}", request.content_type.name(), request.url));
                self.media = Some(request);
            }
            None => self.message = Some("Exercises are answered in the detail view".to_string()),
        }
    }

    fn rebuild_total(&mut self) {
        let Some(parent) = self.screen().parent().cloned() else {
            return;
        };
        match self.catalog.rebuild_total(&parent) {
            Ok(total) => {
                self.total_time = self.config.display.show_totals.then_some(total);
                self.message = Some(format!("Total time rebuilt: {total} min"));
            }
            Err(e) => self.report_error("Rebuild failed", &e),
        }
    }

    // Forms

    fn start_add(&mut self) {
        self.form = match self.screen() {
            Screen::Roots { level } => Some(Form::new_subject(*level)),
            Screen::Chapters { .. } => Some(Form::new_chapter(next_position(
                self.chapters.iter().map(|c| c.position),
            ))),
            Screen::Contents { .. } => Some(Form::new_content(next_position(
                self.contents.iter().map(|c| c.position),
            ))),
            _ => None,
        };
    }

    fn start_edit(&mut self) {
        let i = self.selected_index;
        self.form = match self.screen() {
            Screen::Roots { level } => self.roots.get(i).map(|s| Form::edit_subject(*level, s)),
            Screen::Contents { .. } => self.contents.get(i).map(Form::edit_content),
            Screen::Detail { .. } => self.detail.as_ref().map(Form::edit_content),
            _ => None,
        };
    }

    fn submit_form(&mut self) {
        let Some(mut form) = self.form.take() else {
            return;
        };
        match self.apply_form(&form) {
            Ok(message) => self.message = Some(message),
            Err(e) if is_input_error(&e) => {
                tracing::debug!(error = %e, "form rejected");
                form.error = Some(e.to_string());
                self.form = Some(form);
            }
            Err(e) => self.report_error("Save failed", &e),
        }
    }

    fn apply_form(&self, form: &Form) -> CatalogResult<String> {
        match (&form.kind, self.screen().clone()) {
            (FormKind::NewSubject { level }, _) => {
                let new = NewSubject {
                    name: form.value("Name").to_string(),
                    category: form.value("Category").to_string(),
                    image: load_upload(form.value("Image"))?,
                    tutor_name: form.value("Tutor name").to_string(),
                    tutor_image: load_upload(form.value("Tutor image"))?,
                    description: form.value("Description").to_string(),
                    syllabus_name: form.value("Syllabus name").to_string(),
                    syllabus_document: load_upload(form.value("Syllabus document"))?,
                };
                let subject = self.catalog.create_root(*level, new, &mut log_progress)?;
                Ok(format!("{} \"{}\" created", level.root_noun(), subject.name))
            }
            (FormKind::EditSubject { level, id }, _) => {
                let edit = SubjectEdit {
                    name: form.value("Name").to_string(),
                    category: form.value("Category").to_string(),
                };
                self.catalog.update_root(*level, id, edit)?;
                Ok(format!("{} updated", level.root_noun()))
            }
            (FormKind::NewChapter, Screen::Chapters { parent, .. }) => {
                let new = NewChapter {
                    name: form.value("Name").to_string(),
                    position: position_field(form.value("Position"))?.unwrap_or_default(),
                    week: Some(form.value("Week").to_string()),
                };
                let chapter = self.catalog.create_chapter(&parent, new)?;
                Ok(format!("Chapter \"{}\" created", chapter.name))
            }
            (FormKind::NewContent, Screen::Contents { parent, chapter, .. }) => {
                let file = form.value("File");
                let kind = match ContentType::parse(form.value("Type")).unwrap_or_default() {
                    ContentType::Pdf => NewContentKind::Pdf(load_upload(file)?),
                    ContentType::Video => NewContentKind::Video(load_upload(file)?),
                    ContentType::Exercise => NewContentKind::Exercise(load_questions(file)?),
                };
                let new = NewContent {
                    topic_name: form.value("Topic").to_string(),
                    timeframe: form.value("Timeframe").to_string(),
                    position: position_field(form.value("Position"))?,
                    kind,
                };
                let mut uploaded = None;
                let content = self.catalog.create_content(&parent, &chapter.id, new, &mut |p| {
                    log_progress(p);
                    uploaded = Some(p);
                })?;
                Ok(match uploaded {
                    Some(p) => format!("\"{}\" created (upload {:.0}%)", content.topic_name, p.percent()),
                    None => format!("\"{}\" created", content.topic_name),
                })
            }
            (FormKind::EditContent { id }, Screen::Contents { parent, chapter, .. }) => {
                self.edit_content(&parent, &chapter.id, id, form)
            }
            (FormKind::EditContent { id }, Screen::Detail { parent, chapter_id, .. }) => {
                self.edit_content(&parent, &chapter_id, id, form)
            }
            _ => Err(CatalogError::Validation("Nothing to save on this screen".to_string())),
        }
    }

    fn edit_content(
        &self,
        parent: &ChapterParent,
        chapter_id: &str,
        id: &str,
        form: &Form,
    ) -> CatalogResult<String> {
        let position = position_field(form.value("Position"))?.ok_or_else(|| {
            CatalogError::Validation("Please fill in all fields: position".to_string())
        })?;
        let edit = ContentEdit {
            topic_name: form.value("Topic").to_string(),
            position,
        };
        self.catalog.update_content(parent, chapter_id, id, edit)?;
        Ok("Content updated".to_string())
    }

    // Deletes

    fn start_delete(&mut self) {
        let i = self.selected_index;
        self.confirm = match self.screen() {
            Screen::Roots { level } => self.roots.get(i).map(|s| Confirm {
                prompt: format!("Delete {} \"{}\" and everything in it? (y/n)", level.root_noun().to_lowercase(), s.name),
                target: DeleteTarget::Root { level: *level, id: s.id.clone() },
            }),
            Screen::Chapters { parent, .. } => self.chapters.get(i).map(|c| Confirm {
                prompt: format!("Delete chapter \"{}\" and its contents? (y/n)", c.name),
                target: DeleteTarget::Chapter { parent: parent.clone(), id: c.id.clone() },
            }),
            Screen::Contents { parent, chapter, .. } => self.contents.get(i).map(|c| Confirm {
                prompt: format!("Delete \"{}\"? (y/n)", c.topic_name),
                target: DeleteTarget::Content {
                    parent: parent.clone(),
                    chapter_id: chapter.id.clone(),
                    id: c.id.clone(),
                },
            }),
            Screen::Detail { parent, chapter_id, content_id } => self.detail.as_ref().map(|c| Confirm {
                prompt: format!("Delete \"{}\"? (y/n)", c.topic_name),
                target: DeleteTarget::Content {
                    parent: parent.clone(),
                    chapter_id: chapter_id.clone(),
                    id: content_id.clone(),
                },
            }),
            _ => None,
        };
    }

    fn delete(&mut self, target: DeleteTarget) {
        let result = match &target {
            DeleteTarget::Root { level, id } => self.catalog.delete_root(*level, id),
            DeleteTarget::Chapter { parent, id } => self.catalog.delete_chapter(parent, id),
            DeleteTarget::Content { parent, chapter_id, id } => {
                self.catalog.delete_content(parent, chapter_id, id)
            }
        };

        match result {
            Ok(Some(report)) if report.is_clean() => {
                self.message = Some(format!("Deleted {} item(s)", report.documents_deleted));
            }
            Ok(Some(report)) => {
                self.message = Some(format!(
                    "Deleted, but {} file(s) could not be removed",
                    report.blob_failures.len()
                ));
            }
            Ok(None) => self.message = Some("Already deleted".to_string()),
            Err(e) => {
                self.report_error("Delete failed", &e);
                return;
            }
        }

        if matches!(self.screen(), Screen::Detail { .. }) {
            self.detail = None;
            self.back();
        }
    }

    fn report_error(&mut self, action: &str, e: &CatalogError) {
        tracing::error!(error = %e, "{action}");
        self.message = Some(format!("{action}: {e}"));
    }
}

/// Problems the user can fix without leaving the form.
fn is_input_error(e: &CatalogError) -> bool {
    matches!(e, CatalogError::Validation(_) | CatalogError::Io(_))
}

fn log_progress(progress: UploadProgress) {
    tracing::debug!(transferred = progress.transferred, total = progress.total, "upload progress");
}

fn position_field(value: &str) -> CatalogResult<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| CatalogError::Validation(format!("Position must be a whole number, got \"{value}\"")))
}

fn load_upload(path: &str) -> CatalogResult<Option<Upload>> {
    if path.is_empty() {
        return Ok(None);
    }
    Ok(Some(Upload::from_path(Path::new(path))?))
}

/// Read an exercise from a JSON list of questions.
fn load_questions(path: &str) -> CatalogResult<Vec<NewQuestion>> {
    if path.is_empty() {
        return Err(CatalogError::Validation("Please choose a questions file".to_string()));
    }
    let path = Path::new(path);
    let text = std::fs::read_to_string(path)?;
    let entries: Vec<QuestionEntry> = serde_json::from_str(&text)
        .map_err(|e| CatalogError::Validation(format!("Invalid questions file: {e}")))?;
    if entries.is_empty() {
        return Err(CatalogError::Validation("The questions file has no questions".to_string()));
    }

    let base = path.parent().unwrap_or(Path::new("."));
    let image = |p: Option<PathBuf>| -> CatalogResult<Option<Upload>> {
        match p {
            Some(p) => Ok(Some(Upload::from_path(&base.join(p))?)),
            None => Ok(None),
        }
    };

    entries
        .into_iter()
        .map(|q| {
            let answers = q
                .answers
                .into_iter()
                .map(|a| {
                    Ok(NewAnswer {
                        text: a.text,
                        image: image(a.image)?,
                        is_correct: a.is_correct,
                    })
                })
                .collect::<CatalogResult<Vec<_>>>()?;
            Ok(NewQuestion {
                text: q.text,
                image: image(q.image)?,
                answers,
            })
        })
        .collect()
}
