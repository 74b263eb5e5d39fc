//! crates/lumina_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the hosted database, the AI provider, and the front end.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{
    ChatMessage, EventPatch, EventRow, Flashcard, FolderPatch, FolderRow, NewEvent, NewFolder,
    NewNote, NewSubject, NotePatch, NoteRow, Preferences, SubjectPatch, SubjectRow,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The remote store's row-level access policy rejected the request.
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// CRUD access to the hosted relational backend.
///
/// Implementations are scoped to one authenticated user: every read only sees
/// that user's rows and every insert is stamped with that user's id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // --- Subjects ---
    async fn list_subjects(&self) -> PortResult<Vec<SubjectRow>>;

    async fn insert_subject(&self, draft: &NewSubject) -> PortResult<SubjectRow>;

    async fn update_subject(&self, id: Uuid, patch: &SubjectPatch) -> PortResult<()>;

    async fn delete_subject(&self, id: Uuid) -> PortResult<()>;

    // --- Folders ---
    async fn list_folders(&self) -> PortResult<Vec<FolderRow>>;

    async fn insert_folder(&self, draft: &NewFolder) -> PortResult<FolderRow>;

    async fn update_folder(&self, id: Uuid, patch: &FolderPatch) -> PortResult<()>;

    async fn delete_folder(&self, id: Uuid) -> PortResult<()>;

    // --- Notes ---
    async fn list_notes(&self) -> PortResult<Vec<NoteRow>>;

    async fn insert_note(&self, draft: &NewNote) -> PortResult<NoteRow>;

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> PortResult<()>;

    async fn delete_note(&self, id: Uuid) -> PortResult<()>;

    // --- Events ---
    async fn list_events(&self) -> PortResult<Vec<EventRow>>;

    async fn insert_event(&self, draft: &NewEvent) -> PortResult<EventRow>;

    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> PortResult<()>;

    async fn delete_event(&self, id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait StudyAssistant: Send + Sync {
    /// Answers a chat message given the prior conversation.
    async fn chat(&self, message: &str, history: &[ChatMessage]) -> PortResult<String>;

    /// Produces a student-friendly summary of a note.
    async fn summarize_note(&self, content: &str) -> PortResult<String>;

    /// Generates question/answer cards from a note. A malformed model
    /// response yields an empty list rather than an error.
    async fn generate_flashcards(&self, content: &str) -> PortResult<Vec<Flashcard>>;

    /// Drafts a day-by-day plan for an upcoming exam.
    async fn create_study_plan(&self, exam_date: NaiveDate, topics: &[String]) -> PortResult<String>;
}

/// Persistence for the local preference blob.
pub trait PreferenceStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> PortResult<Option<Preferences>>;

    fn save(&self, preferences: &Preferences) -> PortResult<()>;
}

/// Asks the user to confirm a destructive action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Surfaces a failure to the user.
pub trait AlertSink: Send + Sync {
    fn alert(&self, message: &str);
}

/// A `Confirm` that answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct Always(pub bool);

impl Confirm for Always {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}
