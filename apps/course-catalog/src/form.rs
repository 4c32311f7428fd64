//! Modal input forms.

use content_tree::{Content, ContentType, Level, Subject};
use crossterm::event::{KeyCode, KeyEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Local file to upload.
    Path,
    Choice(Vec<&'static str>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub label: &'static str,
    pub value: String,
    pub kind: FieldKind,
}

impl Field {
    fn text(label: &'static str) -> Self {
        Self { label, value: String::new(), kind: FieldKind::Text }
    }

    fn path(label: &'static str) -> Self {
        Self { label, value: String::new(), kind: FieldKind::Path }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    fn cycle(&mut self, delta: isize) {
        if let FieldKind::Choice(options) = &self.kind {
            let current = options.iter().position(|o| *o == self.value).unwrap_or(0) as isize;
            let next = (current + delta).rem_euclid(options.len() as isize) as usize;
            self.value = options[next].to_string();
        }
    }
}

/// What the form is for, with the ids it needs on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
    NewSubject { level: Level },
    EditSubject { level: Level, id: String },
    NewChapter,
    NewContent,
    EditContent { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    Continue,
    Submit,
    Cancel,
}

#[derive(Debug, Clone)]
pub struct Form {
    pub kind: FormKind,
    pub title: String,
    pub fields: Vec<Field>,
    pub focus: usize,
    pub error: Option<String>,
}

impl Form {
    fn new(kind: FormKind, title: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            kind,
            title: title.into(),
            fields,
            focus: 0,
            error: None,
        }
    }

    pub fn new_subject(level: Level) -> Self {
        Self::new(
            FormKind::NewSubject { level },
            format!(" New {} ({level}) ", level.root_noun()),
            vec![
                Field::text("Name"),
                Field::text("Category"),
                Field::path("Image"),
                Field::text("Tutor name"),
                Field::path("Tutor image"),
                Field::text("Description"),
                Field::text("Syllabus name"),
                Field::path("Syllabus document"),
            ],
        )
    }

    pub fn edit_subject(level: Level, subject: &Subject) -> Self {
        Self::new(
            FormKind::EditSubject { level, id: subject.id.clone() },
            format!(" Edit {} ", level.root_noun()),
            vec![
                Field::text("Name").with_value(&subject.name),
                Field::text("Category").with_value(&subject.category),
            ],
        )
    }

    pub fn new_chapter(next_position: i64) -> Self {
        Self::new(
            FormKind::NewChapter,
            " New Chapter ",
            vec![
                Field::text("Name"),
                Field::text("Position").with_value(next_position.to_string()),
                Field::text("Week"),
            ],
        )
    }

    pub fn new_content(next_position: i64) -> Self {
        let types: Vec<&'static str> = ContentType::ALL.iter().map(|t| t.name()).collect();
        let first = types[0];
        Self::new(
            FormKind::NewContent,
            " New Content ",
            vec![
                Field { label: "Type", value: first.to_string(), kind: FieldKind::Choice(types) },
                Field::text("Topic"),
                Field::text("Timeframe"),
                Field::text("Position").with_value(next_position.to_string()),
                Field::path("File"),
            ],
        )
    }

    pub fn edit_content(content: &Content) -> Self {
        Self::new(
            FormKind::EditContent { id: content.id.clone() },
            " Edit Content ",
            vec![
                Field::text("Topic").with_value(&content.topic_name),
                Field::text("Position").with_value(content.position.to_string()),
            ],
        )
    }

    /// Value of a field by label; empty when absent.
    pub fn value(&self, label: &str) -> &str {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.trim())
            .unwrap_or("")
    }

    /// Label of the file field, which depends on the chosen content type.
    pub fn file_label(&self) -> &'static str {
        match ContentType::parse(self.value("Type")) {
            Some(ContentType::Exercise) => "Questions file",
            _ => "File",
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormAction {
        match key.code {
            KeyCode::Esc => return FormAction::Cancel,
            KeyCode::Enter => return FormAction::Submit,
            KeyCode::Tab | KeyCode::Down => self.move_focus(1),
            KeyCode::BackTab | KeyCode::Up => self.move_focus(-1),
            KeyCode::Left => self.fields[self.focus].cycle(-1),
            KeyCode::Right => self.fields[self.focus].cycle(1),
            KeyCode::Backspace => {
                let field = &mut self.fields[self.focus];
                if !matches!(field.kind, FieldKind::Choice(_)) {
                    field.value.pop();
                }
            }
            KeyCode::Char(c) => {
                let field = &mut self.fields[self.focus];
                match field.kind {
                    FieldKind::Choice(_) if c == ' ' => field.cycle(1),
                    FieldKind::Choice(_) => {}
                    _ => field.value.push(c),
                }
            }
            _ => {}
        }
        FormAction::Continue
    }

    fn move_focus(&mut self, delta: isize) {
        let len = self.fields.len() as isize;
        self.focus = (self.focus as isize + delta).rem_euclid(len) as usize;
    }
}

/// Next free position after the last item.
pub fn next_position(positions: impl Iterator<Item = i64>) -> i64 {
    positions.max().map(|p| p.saturating_add(1)).unwrap_or(1)
}
