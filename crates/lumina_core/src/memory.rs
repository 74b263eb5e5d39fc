//! crates/lumina_core/src/memory.rs
//!
//! An in-memory `RemoteStore` for offline runs and tests. It follows the same
//! relational rules as the hosted schema: children need an existing parent,
//! deletes cascade to folders and notes, and a deleted subject is detached
//! from its events.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    EventPatch, EventRow, FolderPatch, FolderRow, NewEvent, NewFolder, NewNote, NewSubject,
    NotePatch, NoteRow, SubjectPatch, SubjectRow,
};
use crate::ports::{PortError, PortResult, RemoteStore};

/// The rows held by a `MemoryRemote`, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub subjects: Vec<SubjectRow>,
    pub folders: Vec<FolderRow>,
    pub notes: Vec<NoteRow>,
    pub events: Vec<EventRow>,
}

#[derive(Debug, Default)]
pub struct MemoryRemote {
    tables: Mutex<Tables>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every table at once.
    pub fn seed(&self, tables: Tables) {
        *self.lock() = tables;
    }

    /// A copy of the current rows.
    pub fn tables(&self) -> Tables {
        self.lock().clone()
    }

    pub fn note(&self, id: Uuid) -> Option<NoteRow> {
        self.lock().notes.iter().find(|n| n.id == id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing(kind: &str, id: Uuid) -> PortError {
    PortError::NotFound(format!("{kind} {id} not found"))
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list_subjects(&self) -> PortResult<Vec<SubjectRow>> {
        Ok(self.lock().subjects.clone())
    }

    async fn insert_subject(&self, draft: &NewSubject) -> PortResult<SubjectRow> {
        let row = SubjectRow {
            id: Uuid::new_v4(),
            name: draft.name.clone(),
            color: draft.color.clone(),
        };
        self.lock().subjects.push(row.clone());
        Ok(row)
    }

    async fn update_subject(&self, id: Uuid, patch: &SubjectPatch) -> PortResult<()> {
        let mut tables = self.lock();
        let row = tables
            .subjects
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| missing("subject", id))?;
        if let Some(name) = &patch.name {
            row.name = name.clone();
        }
        if let Some(color) = &patch.color {
            row.color = color.clone();
        }
        Ok(())
    }

    async fn delete_subject(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.lock();
        let before = tables.subjects.len();
        tables.subjects.retain(|s| s.id != id);
        if tables.subjects.len() == before {
            return Err(missing("subject", id));
        }
        let folder_ids: Vec<Uuid> = tables
            .folders
            .iter()
            .filter(|f| f.subject_id == id)
            .map(|f| f.id)
            .collect();
        tables.folders.retain(|f| f.subject_id != id);
        tables.notes.retain(|n| !folder_ids.contains(&n.folder_id));
        for event in tables.events.iter_mut().filter(|e| e.subject_id == Some(id)) {
            event.subject_id = None;
        }
        Ok(())
    }

    async fn list_folders(&self) -> PortResult<Vec<FolderRow>> {
        Ok(self.lock().folders.clone())
    }

    async fn insert_folder(&self, draft: &NewFolder) -> PortResult<FolderRow> {
        let mut tables = self.lock();
        if !tables.subjects.iter().any(|s| s.id == draft.subject_id) {
            return Err(missing("subject", draft.subject_id));
        }
        let row = FolderRow {
            id: Uuid::new_v4(),
            subject_id: draft.subject_id,
            name: draft.name.clone(),
        };
        tables.folders.push(row.clone());
        Ok(row)
    }

    async fn update_folder(&self, id: Uuid, patch: &FolderPatch) -> PortResult<()> {
        let mut tables = self.lock();
        let row = tables
            .folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| missing("folder", id))?;
        if let Some(name) = &patch.name {
            row.name = name.clone();
        }
        Ok(())
    }

    async fn delete_folder(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.lock();
        let before = tables.folders.len();
        tables.folders.retain(|f| f.id != id);
        if tables.folders.len() == before {
            return Err(missing("folder", id));
        }
        tables.notes.retain(|n| n.folder_id != id);
        Ok(())
    }

    async fn list_notes(&self) -> PortResult<Vec<NoteRow>> {
        Ok(self.lock().notes.clone())
    }

    async fn insert_note(&self, draft: &NewNote) -> PortResult<NoteRow> {
        let mut tables = self.lock();
        if !tables.folders.iter().any(|f| f.id == draft.folder_id) {
            return Err(missing("folder", draft.folder_id));
        }
        let row = NoteRow {
            id: Uuid::new_v4(),
            folder_id: draft.folder_id,
            title: draft.title.clone(),
            content: draft.content.clone(),
            created_at: Utc::now(),
            summary: None,
        };
        tables.notes.push(row.clone());
        Ok(row)
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> PortResult<()> {
        let mut tables = self.lock();
        let row = tables
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| missing("note", id))?;
        if let Some(title) = &patch.title {
            row.title = title.clone();
        }
        if let Some(content) = &patch.content {
            row.content = content.clone();
        }
        if let Some(summary) = &patch.summary {
            row.summary = summary.clone();
        }
        Ok(())
    }

    async fn delete_note(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.lock();
        let before = tables.notes.len();
        tables.notes.retain(|n| n.id != id);
        if tables.notes.len() == before {
            return Err(missing("note", id));
        }
        Ok(())
    }

    async fn list_events(&self) -> PortResult<Vec<EventRow>> {
        Ok(self.lock().events.clone())
    }

    async fn insert_event(&self, draft: &NewEvent) -> PortResult<EventRow> {
        let mut tables = self.lock();
        if let Some(subject_id) = draft.subject_id {
            if !tables.subjects.iter().any(|s| s.id == subject_id) {
                return Err(missing("subject", subject_id));
            }
        }
        let row = EventRow {
            id: Uuid::new_v4(),
            title: draft.title.clone(),
            date: draft.date,
            kind: draft.kind,
            subject_id: draft.subject_id,
        };
        tables.events.push(row.clone());
        Ok(row)
    }

    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> PortResult<()> {
        let mut tables = self.lock();
        let row = tables
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| missing("event", id))?;
        if let Some(title) = &patch.title {
            row.title = title.clone();
        }
        if let Some(date) = patch.date {
            row.date = date;
        }
        if let Some(kind) = patch.kind {
            row.kind = kind;
        }
        if let Some(subject_id) = patch.subject_id {
            row.subject_id = subject_id;
        }
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> PortResult<()> {
        let mut tables = self.lock();
        let before = tables.events.len();
        tables.events.retain(|e| e.id != id);
        if tables.events.len() == before {
            return Err(missing("event", id));
        }
        Ok(())
    }
}
