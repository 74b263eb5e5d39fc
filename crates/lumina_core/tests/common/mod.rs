//! Shared test doubles for the store tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use lumina_core::domain::{
    EventPatch, EventRow, FolderRow, NewEvent, NewFolder, NewNote, NewSubject, NoteRow,
    SubjectRow,
};
use lumina_core::flashcards::parse_flashcards;
use lumina_core::memory::{MemoryRemote, Tables};
use lumina_core::{
    AlertSink, ChatMessage, Flashcard, FolderPatch, NotePatch, PortError, PortResult, RemoteStore,
    StudyAssistant, StudyStore, SubjectPatch,
};
use tokio::sync::Notify;
use uuid::Uuid;

/// Wraps the in-memory remote with failure injection, an insert gate and a
/// call log.
#[derive(Default)]
pub struct FakeRemote {
    pub memory: MemoryRemote,
    failing: Mutex<HashSet<&'static str>>,
    gate: Mutex<Option<Arc<Notify>>>,
    delete_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRemote {
    /// Makes every later call to `op` fail the way a row-level policy would.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Suspends inserts until the returned `Notify` is signalled.
    pub fn hold_inserts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Suspends deletes until the returned `Notify` is signalled.
    pub fn hold_deletes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.delete_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tables(&self) -> Tables {
        self.memory.tables()
    }

    pub fn note_row(&self, id: Uuid) -> Option<NoteRow> {
        self.memory.note(id)
    }

    fn record(&self, op: &'static str) -> PortResult<()> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.failing.lock().unwrap().contains(op) {
            return Err(PortError::AccessDenied(format!(
                "{op}: new row violates row-level security policy"
            )));
        }
        Ok(())
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    async fn pass_delete_gate(&self) {
        let gate = self.delete_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list_subjects(&self) -> PortResult<Vec<SubjectRow>> {
        self.record("list_subjects")?;
        self.memory.list_subjects().await
    }

    async fn insert_subject(&self, draft: &NewSubject) -> PortResult<SubjectRow> {
        self.pass_gate().await;
        self.record("insert_subject")?;
        self.memory.insert_subject(draft).await
    }

    async fn update_subject(&self, id: Uuid, patch: &SubjectPatch) -> PortResult<()> {
        self.record("update_subject")?;
        self.memory.update_subject(id, patch).await
    }

    async fn delete_subject(&self, id: Uuid) -> PortResult<()> {
        self.pass_delete_gate().await;
        self.record("delete_subject")?;
        self.memory.delete_subject(id).await
    }

    async fn list_folders(&self) -> PortResult<Vec<FolderRow>> {
        self.record("list_folders")?;
        self.memory.list_folders().await
    }

    async fn insert_folder(&self, draft: &NewFolder) -> PortResult<FolderRow> {
        self.pass_gate().await;
        self.record("insert_folder")?;
        self.memory.insert_folder(draft).await
    }

    async fn update_folder(&self, id: Uuid, patch: &FolderPatch) -> PortResult<()> {
        self.record("update_folder")?;
        self.memory.update_folder(id, patch).await
    }

    async fn delete_folder(&self, id: Uuid) -> PortResult<()> {
        self.pass_delete_gate().await;
        self.record("delete_folder")?;
        self.memory.delete_folder(id).await
    }

    async fn list_notes(&self) -> PortResult<Vec<NoteRow>> {
        self.record("list_notes")?;
        self.memory.list_notes().await
    }

    async fn insert_note(&self, draft: &NewNote) -> PortResult<NoteRow> {
        self.pass_gate().await;
        self.record("insert_note")?;
        self.memory.insert_note(draft).await
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> PortResult<()> {
        self.record("update_note")?;
        self.memory.update_note(id, patch).await
    }

    async fn delete_note(&self, id: Uuid) -> PortResult<()> {
        self.pass_delete_gate().await;
        self.record("delete_note")?;
        self.memory.delete_note(id).await
    }

    async fn list_events(&self) -> PortResult<Vec<EventRow>> {
        self.record("list_events")?;
        self.memory.list_events().await
    }

    async fn insert_event(&self, draft: &NewEvent) -> PortResult<EventRow> {
        self.pass_gate().await;
        self.record("insert_event")?;
        self.memory.insert_event(draft).await
    }

    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> PortResult<()> {
        self.record("update_event")?;
        self.memory.update_event(id, patch).await
    }

    async fn delete_event(&self, id: Uuid) -> PortResult<()> {
        self.pass_delete_gate().await;
        self.record("delete_event")?;
        self.memory.delete_event(id).await
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// An assistant that answers from canned text. Flashcards go through the
/// real parser so malformed output can be exercised.
pub struct CannedAssistant {
    pub reply: PortResult<String>,
    pub flashcards_raw: String,
    pub prompts: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl CannedAssistant {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            flashcards_raw: "[]".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(PortError::Unexpected("connection reset".to_string())),
            flashcards_raw: "[]".to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn answer(&self) -> PortResult<String> {
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(err) => Err(PortError::Unexpected(err.to_string())),
        }
    }
}

#[async_trait]
impl StudyAssistant for CannedAssistant {
    async fn chat(&self, message: &str, history: &[ChatMessage]) -> PortResult<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((message.to_string(), history.to_vec()));
        self.answer()
    }

    async fn summarize_note(&self, _content: &str) -> PortResult<String> {
        self.answer()
    }

    async fn generate_flashcards(&self, _content: &str) -> PortResult<Vec<Flashcard>> {
        self.answer()?;
        Ok(parse_flashcards(&self.flashcards_raw))
    }

    async fn create_study_plan(&self, _exam_date: NaiveDate, _topics: &[String]) -> PortResult<String> {
        self.answer()
    }
}

pub fn setup() -> (StudyStore, Arc<FakeRemote>, Arc<RecordingAlerts>) {
    let remote = Arc::new(FakeRemote::default());
    let alerts = Arc::new(RecordingAlerts::default());
    let store = StudyStore::new(remote.clone(), alerts.clone());
    (store, remote, alerts)
}
