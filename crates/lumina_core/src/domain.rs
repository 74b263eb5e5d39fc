//! crates/lumina_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport; the only
//! serialization they carry is the JSON shape the front end consumes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Identifiers
//=========================================================================================

/// A locally synthesized identifier for a record the server has not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(u64);

impl TempId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// The identity of a record held by the store.
///
/// Remote ports only ever accept the `Uuid` of a `Confirmed` id, so a
/// provisional record cannot be targeted on the server by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    Provisional(TempId),
    Confirmed(Uuid),
}

impl EntityId {
    /// Returns the server id, if the record has been confirmed.
    pub fn confirmed(self) -> Option<Uuid> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Provisional(_) => None,
        }
    }

    pub fn is_provisional(self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self::Confirmed(id)
    }
}

impl From<TempId> for EntityId {
    fn from(id: TempId) -> Self {
        Self::Provisional(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(temp) => fmt::Display::fmt(temp, f),
            Self::Confirmed(id) => fmt::Display::fmt(id, f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is neither a temporary id nor a UUID")]
pub struct IdParseError(pub String);

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(raw) = s.strip_prefix("tmp-") {
            return raw
                .parse::<u64>()
                .map(|n| Self::Provisional(TempId(n)))
                .map_err(|_| IdParseError(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self::Confirmed)
            .map_err(|_| IdParseError(s.to_string()))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

//=========================================================================================
// Entities
//=========================================================================================

/// A course or topic the user studies. Owns its folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: EntityId,
    pub name: String,
    /// Display-color tag, e.g. `indigo`.
    pub color: String,
    pub folders: Vec<Folder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: EntityId,
    pub subject_id: Uuid,
    pub name: String,
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: EntityId,
    pub folder_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
    /// Generated on demand and kept locally; the remote schema has no column for them.
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

/// A single question/answer study card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Study,
    Exam,
    Deadline,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Exam => "exam",
            Self::Deadline => "deadline",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "study" => Ok(Self::Study),
            "exam" => Ok(Self::Exam),
            "deadline" => Ok(Self::Deadline),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// A calendar entry. Events live in a flat collection, not under subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyEvent {
    pub id: EntityId,
    pub title: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub subject_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, text: text.into() }
    }
}

/// The persisted local preference blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub dark_mode: bool,
    pub compact_view: bool,
}

//=========================================================================================
// Remote Rows
//=========================================================================================
// Flat records as the remote store returns them, with server-assigned ids.

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRow {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderRow {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    pub kind: EventKind,
    pub subject_id: Option<Uuid>,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            color: row.color,
            folders: Vec::new(),
        }
    }
}

impl From<FolderRow> for Folder {
    fn from(row: FolderRow) -> Self {
        Self {
            id: row.id.into(),
            subject_id: row.subject_id,
            name: row.name,
            notes: Vec::new(),
        }
    }
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Self {
            id: row.id.into(),
            folder_id: row.folder_id,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            summary: row.summary,
            flashcards: Vec::new(),
        }
    }
}

impl From<EventRow> for StudyEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id.into(),
            title: row.title,
            date: row.date,
            kind: row.kind,
            subject_id: row.subject_id,
        }
    }
}

//=========================================================================================
// Drafts
//=========================================================================================
// Client-supplied fields for a create call.

#[derive(Debug, Clone, PartialEq)]
pub struct NewSubject {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFolder {
    pub subject_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNote {
    pub folder_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    pub kind: EventKind,
    pub subject_id: Option<Uuid>,
}

//=========================================================================================
// Patches
//=========================================================================================
// Partial updates. `None` leaves a field untouched. `merge` lets a later patch
// win field by field, and `inverse` captures the values a patch would overwrite
// so a failed remote write can be undone.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl SubjectPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none()
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            name: later.name.or(self.name),
            color: later.color.or(self.color),
        }
    }

    pub fn inverse(&self, current: &Subject) -> Self {
        Self {
            name: self.name.as_ref().map(|_| current.name.clone()),
            color: self.color.as_ref().map(|_| current.color.clone()),
        }
    }

    pub fn apply(&self, subject: &mut Subject) {
        if let Some(name) = &self.name {
            subject.name = name.clone();
        }
        if let Some(color) = &self.color {
            subject.color = color.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderPatch {
    pub name: Option<String>,
}

impl FolderPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            name: later.name.or(self.name),
        }
    }

    pub fn inverse(&self, current: &Folder) -> Self {
        Self {
            name: self.name.as_ref().map(|_| current.name.clone()),
        }
    }

    pub fn apply(&self, folder: &mut Folder) {
        if let Some(name) = &self.name {
            folder.name = name.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` clears the summary.
    pub summary: Option<Option<String>>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.summary.is_none()
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            title: later.title.or(self.title),
            content: later.content.or(self.content),
            summary: later.summary.or(self.summary),
        }
    }

    pub fn inverse(&self, current: &Note) -> Self {
        Self {
            title: self.title.as_ref().map(|_| current.title.clone()),
            content: self.content.as_ref().map(|_| current.content.clone()),
            summary: self.summary.as_ref().map(|_| current.summary.clone()),
        }
    }

    pub fn apply(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(summary) = &self.summary {
            note.summary = summary.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub kind: Option<EventKind>,
    /// `Some(None)` detaches the event from its subject.
    pub subject_id: Option<Option<Uuid>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.date.is_none() && self.kind.is_none() && self.subject_id.is_none()
    }

    pub fn merge(self, later: Self) -> Self {
        Self {
            title: later.title.or(self.title),
            date: later.date.or(self.date),
            kind: later.kind.or(self.kind),
            subject_id: later.subject_id.or(self.subject_id),
        }
    }

    pub fn inverse(&self, current: &StudyEvent) -> Self {
        Self {
            title: self.title.as_ref().map(|_| current.title.clone()),
            date: self.date.map(|_| current.date),
            kind: self.kind.map(|_| current.kind),
            subject_id: self.subject_id.map(|_| current.subject_id),
        }
    }

    pub fn apply(&self, event: &mut StudyEvent) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(kind) = self.kind {
            event.kind = kind;
        }
        if let Some(subject_id) = self.subject_id {
            event.subject_id = subject_id;
        }
    }
}
