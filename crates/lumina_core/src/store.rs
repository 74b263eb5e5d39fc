//! crates/lumina_core/src/store.rs
//!
//! The client-side state store. Holds the nested subject tree and the flat
//! event list, and keeps them in sync with the remote store through
//! optimistic writes:
//!
//! - creates insert a provisional record first, then reconcile it in place
//!   with the server row, or remove it if the insert fails;
//! - updates and deletes apply locally, then call the remote store, and
//!   restore the previous local state if that call fails;
//! - updates and deletes aimed at a provisional record are queued and
//!   replayed against the server id once its create resolves.
//!
//! Every failure is logged and sent to the `AlertSink`. Nothing is retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    EntityId, EventKind, EventPatch, EventRow, Flashcard, Folder, FolderPatch, FolderRow,
    NewEvent, NewFolder, NewNote, NewSubject, Note, NotePatch, NoteRow, StudyEvent, Subject,
    SubjectPatch, SubjectRow, TempId,
};
use crate::ports::{AlertSink, Confirm, PortError, PortResult, RemoteStore, StudyAssistant};
use crate::query;

/// Display-color tags handed out to new subjects in rotation.
pub const SUBJECT_COLORS: [&str; 5] = ["blue", "indigo", "purple", "emerald", "rose"];

pub const UNTITLED_NOTE: &str = "Untitled Note";

//=========================================================================================
// Errors and Outcomes
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: EntityId },
    /// The parent is still provisional, so the server has no row to attach to.
    #[error("{kind} {id} is still waiting for the server to confirm it")]
    ParentNotConfirmed { kind: &'static str, id: EntityId },
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("note {0} has no content to work with")]
    EmptyNote(EntityId),
    #[error("Remote store error: {0}")]
    Remote(#[from] PortError),
    #[error("Study assistant error: {0}")]
    Assistant(PortError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How an update was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Written locally and confirmed by the remote store.
    Applied,
    /// Written locally; the remote write waits for the record's create to resolve.
    Queued,
}

/// How a delete request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    /// Removed locally; the remote delete waits for the record's create to resolve.
    Queued,
    /// The user declined the confirmation; nothing was touched.
    Declined,
}

//=========================================================================================
// Internal State
//=========================================================================================

#[derive(Default)]
struct State {
    subjects: Vec<Subject>,
    events: Vec<StudyEvent>,
    /// Temporary ids of reconciled records, so late callers still resolve.
    aliases: HashMap<TempId, Uuid>,
    queued_subjects: HashMap<TempId, Queued<Subject>>,
    queued_folders: HashMap<TempId, Queued<Folder>>,
    queued_notes: HashMap<TempId, Queued<Note>>,
    queued_events: HashMap<TempId, Queued<StudyEvent>>,
}

impl State {
    fn resolve(&self, id: EntityId) -> EntityId {
        match id {
            EntityId::Provisional(temp) => self
                .aliases
                .get(&temp)
                .map_or(id, |real| EntityId::Confirmed(*real)),
            confirmed => confirmed,
        }
    }

    fn subject_index(&self, id: EntityId) -> Option<usize> {
        self.subjects.iter().position(|s| s.id == id)
    }

    fn folder_path(&self, id: EntityId) -> Option<(usize, usize)> {
        self.subjects.iter().enumerate().find_map(|(si, subject)| {
            subject
                .folders
                .iter()
                .position(|f| f.id == id)
                .map(|fi| (si, fi))
        })
    }

    fn note_path(&self, id: EntityId) -> Option<(usize, usize, usize)> {
        self.subjects.iter().enumerate().find_map(|(si, subject)| {
            subject.folders.iter().enumerate().find_map(|(fi, folder)| {
                folder
                    .notes
                    .iter()
                    .position(|n| n.id == id)
                    .map(|ni| (si, fi, ni))
            })
        })
    }

    fn event_index(&self, id: EntityId) -> Option<usize> {
        self.events.iter().position(|e| e.id == id)
    }

    /// Catches restored records up with creates that resolved while they were
    /// detached: confirmed ones take their server id, failed ones are dropped.
    fn settle_restored(&mut self) {
        let State {
            subjects,
            events,
            aliases,
            queued_subjects,
            queued_folders,
            queued_notes,
            queued_events,
        } = self;
        let aliases = &*aliases;
        let (queued_subjects, queued_folders) = (&*queued_subjects, &*queued_folders);
        let (queued_notes, queued_events) = (&*queued_notes, &*queued_events);
        subjects.retain_mut(|subject| {
            subject.folders.retain_mut(|folder| {
                folder
                    .notes
                    .retain_mut(|note| settle(&mut note.id, aliases, queued_notes));
                settle(&mut folder.id, aliases, queued_folders)
            });
            settle(&mut subject.id, aliases, queued_subjects)
        });
        events.retain_mut(|event| settle(&mut event.id, aliases, queued_events));
    }
}

/// Returns false for a provisional record whose create failed while it was
/// out of the workspace.
fn settle<E: Tracked>(
    id: &mut EntityId,
    aliases: &HashMap<TempId, Uuid>,
    queue: &HashMap<TempId, Queued<E>>,
) -> bool {
    let EntityId::Provisional(temp) = *id else {
        return true;
    };
    if let Some(real) = aliases.get(&temp) {
        debug!(kind = E::KIND, %temp, id = %real, "restored record takes its server id");
        *id = EntityId::Confirmed(*real);
        return true;
    }
    if queue.contains_key(&temp) {
        return true;
    }
    debug!(kind = E::KIND, %temp, "dropping restored record whose create failed");
    false
}

/// Work waiting on a provisional record's create.
struct Queued<E: Tracked> {
    patch: Option<E::Patch>,
    /// Field values from before the first queued patch.
    undo: Option<E::Patch>,
    removed: Option<Removed<E>>,
}

impl<E: Tracked> Default for Queued<E> {
    fn default() -> Self {
        Self {
            patch: None,
            undo: None,
            removed: None,
        }
    }
}

/// A record taken out of its collection, with enough context to put it back.
struct Removed<E> {
    record: E,
    index: usize,
    /// Events whose subject reference was cleared along with the record.
    cleared_events: Vec<EntityId>,
}

fn insert_at<T>(items: &mut Vec<T>, index: Option<usize>, item: T) {
    match index {
        Some(index) => items.insert(index.min(items.len()), item),
        None => items.push(item),
    }
}

//=========================================================================================
// Per-entity Plumbing
//=========================================================================================

trait FieldPatch<E>: Clone + Send + Sync + 'static {
    fn is_empty(&self) -> bool;
    fn merge(self, later: Self) -> Self;
    fn inverse(&self, current: &E) -> Self;
    fn apply(&self, target: &mut E);
}

macro_rules! field_patch {
    ($patch:ty => $entity:ty) => {
        impl FieldPatch<$entity> for $patch {
            fn is_empty(&self) -> bool {
                <$patch>::is_empty(self)
            }
            fn merge(self, later: Self) -> Self {
                <$patch>::merge(self, later)
            }
            fn inverse(&self, current: &$entity) -> Self {
                <$patch>::inverse(self, current)
            }
            fn apply(&self, target: &mut $entity) {
                <$patch>::apply(self, target)
            }
        }
    };
}

field_patch!(SubjectPatch => Subject);
field_patch!(FolderPatch => Folder);
field_patch!(NotePatch => Note);
field_patch!(EventPatch => StudyEvent);

/// Where a record type lives in the store and how it talks to the remote store.
#[async_trait]
trait Tracked: Clone + Send + Sync + Sized + 'static {
    type Draft: Send + Sync + 'static;
    type Row: Send + 'static;
    type Patch: FieldPatch<Self>;

    const KIND: &'static str;
    const DELETE_PROMPT: &'static str;

    fn provisional(temp: TempId, draft: &Self::Draft) -> Self;
    fn row_id(row: &Self::Row) -> Uuid;
    /// Adopts the server id and any server-populated fields.
    fn confirm(&mut self, row: Self::Row);

    fn queue(state: &mut State) -> &mut HashMap<TempId, Queued<Self>>;
    fn find_mut(state: &mut State, id: EntityId) -> Option<&mut Self>;
    /// Returns false when the record's parent no longer exists.
    fn attach(state: &mut State, record: Self, index: Option<usize>) -> bool;
    fn detach(state: &mut State, id: EntityId) -> Option<Removed<Self>>;

    fn reattach(state: &mut State, removed: Removed<Self>) {
        if !Self::attach(state, removed.record, Some(removed.index)) {
            warn!(kind = Self::KIND, "parent is gone; record cannot be restored");
        }
    }

    async fn remote_insert(remote: &dyn RemoteStore, draft: &Self::Draft) -> PortResult<Self::Row>;
    async fn remote_update(remote: &dyn RemoteStore, id: Uuid, patch: &Self::Patch) -> PortResult<()>;
    async fn remote_delete(remote: &dyn RemoteStore, id: Uuid) -> PortResult<()>;
}

#[async_trait]
impl Tracked for Subject {
    type Draft = NewSubject;
    type Row = SubjectRow;
    type Patch = SubjectPatch;

    const KIND: &'static str = "subject";
    const DELETE_PROMPT: &'static str = "Delete this subject and all its contents?";

    fn provisional(temp: TempId, draft: &NewSubject) -> Self {
        Self {
            id: temp.into(),
            name: draft.name.clone(),
            color: draft.color.clone(),
            folders: Vec::new(),
        }
    }

    fn row_id(row: &SubjectRow) -> Uuid {
        row.id
    }

    fn confirm(&mut self, row: SubjectRow) {
        self.id = row.id.into();
    }

    fn queue(state: &mut State) -> &mut HashMap<TempId, Queued<Self>> {
        &mut state.queued_subjects
    }

    fn find_mut(state: &mut State, id: EntityId) -> Option<&mut Self> {
        let index = state.subject_index(id)?;
        state.subjects.get_mut(index)
    }

    fn attach(state: &mut State, record: Self, index: Option<usize>) -> bool {
        insert_at(&mut state.subjects, index, record);
        true
    }

    fn detach(state: &mut State, id: EntityId) -> Option<Removed<Self>> {
        let index = state.subject_index(id)?;
        let record = state.subjects.remove(index);
        let mut cleared_events = Vec::new();
        if let Some(subject_id) = id.confirmed() {
            for event in state.events.iter_mut() {
                if event.subject_id == Some(subject_id) {
                    event.subject_id = None;
                    cleared_events.push(event.id);
                }
            }
        }
        Some(Removed {
            record,
            index,
            cleared_events,
        })
    }

    fn reattach(state: &mut State, removed: Removed<Self>) {
        let subject_id = removed.record.id.confirmed();
        insert_at(&mut state.subjects, Some(removed.index), removed.record);
        for event in state.events.iter_mut() {
            if removed.cleared_events.contains(&event.id) {
                event.subject_id = subject_id;
            }
        }
    }

    async fn remote_insert(remote: &dyn RemoteStore, draft: &NewSubject) -> PortResult<SubjectRow> {
        remote.insert_subject(draft).await
    }

    async fn remote_update(remote: &dyn RemoteStore, id: Uuid, patch: &SubjectPatch) -> PortResult<()> {
        remote.update_subject(id, patch).await
    }

    async fn remote_delete(remote: &dyn RemoteStore, id: Uuid) -> PortResult<()> {
        remote.delete_subject(id).await
    }
}

#[async_trait]
impl Tracked for Folder {
    type Draft = NewFolder;
    type Row = FolderRow;
    type Patch = FolderPatch;

    const KIND: &'static str = "folder";
    const DELETE_PROMPT: &'static str = "Delete this folder and all its notes?";

    fn provisional(temp: TempId, draft: &NewFolder) -> Self {
        Self {
            id: temp.into(),
            subject_id: draft.subject_id,
            name: draft.name.clone(),
            notes: Vec::new(),
        }
    }

    fn row_id(row: &FolderRow) -> Uuid {
        row.id
    }

    fn confirm(&mut self, row: FolderRow) {
        self.id = row.id.into();
    }

    fn queue(state: &mut State) -> &mut HashMap<TempId, Queued<Self>> {
        &mut state.queued_folders
    }

    fn find_mut(state: &mut State, id: EntityId) -> Option<&mut Self> {
        let (si, fi) = state.folder_path(id)?;
        state.subjects[si].folders.get_mut(fi)
    }

    fn attach(state: &mut State, record: Self, index: Option<usize>) -> bool {
        match state.subject_index(EntityId::Confirmed(record.subject_id)) {
            Some(si) => {
                insert_at(&mut state.subjects[si].folders, index, record);
                true
            }
            None => false,
        }
    }

    fn detach(state: &mut State, id: EntityId) -> Option<Removed<Self>> {
        let (si, fi) = state.folder_path(id)?;
        let record = state.subjects[si].folders.remove(fi);
        Some(Removed {
            record,
            index: fi,
            cleared_events: Vec::new(),
        })
    }

    async fn remote_insert(remote: &dyn RemoteStore, draft: &NewFolder) -> PortResult<FolderRow> {
        remote.insert_folder(draft).await
    }

    async fn remote_update(remote: &dyn RemoteStore, id: Uuid, patch: &FolderPatch) -> PortResult<()> {
        remote.update_folder(id, patch).await
    }

    async fn remote_delete(remote: &dyn RemoteStore, id: Uuid) -> PortResult<()> {
        remote.delete_folder(id).await
    }
}

#[async_trait]
impl Tracked for Note {
    type Draft = NewNote;
    type Row = NoteRow;
    type Patch = NotePatch;

    const KIND: &'static str = "note";
    const DELETE_PROMPT: &'static str = "Delete this note?";

    fn provisional(temp: TempId, draft: &NewNote) -> Self {
        Self {
            id: temp.into(),
            folder_id: draft.folder_id,
            title: draft.title.clone(),
            content: draft.content.clone(),
            created_at: draft.created_at,
            summary: None,
            flashcards: Vec::new(),
        }
    }

    fn row_id(row: &NoteRow) -> Uuid {
        row.id
    }

    fn confirm(&mut self, row: NoteRow) {
        self.id = row.id.into();
        self.created_at = row.created_at;
    }

    fn queue(state: &mut State) -> &mut HashMap<TempId, Queued<Self>> {
        &mut state.queued_notes
    }

    fn find_mut(state: &mut State, id: EntityId) -> Option<&mut Self> {
        let (si, fi, ni) = state.note_path(id)?;
        state.subjects[si].folders[fi].notes.get_mut(ni)
    }

    fn attach(state: &mut State, record: Self, index: Option<usize>) -> bool {
        match state.folder_path(EntityId::Confirmed(record.folder_id)) {
            Some((si, fi)) => {
                insert_at(&mut state.subjects[si].folders[fi].notes, index, record);
                true
            }
            None => false,
        }
    }

    fn detach(state: &mut State, id: EntityId) -> Option<Removed<Self>> {
        let (si, fi, ni) = state.note_path(id)?;
        let record = state.subjects[si].folders[fi].notes.remove(ni);
        Some(Removed {
            record,
            index: ni,
            cleared_events: Vec::new(),
        })
    }

    async fn remote_insert(remote: &dyn RemoteStore, draft: &NewNote) -> PortResult<NoteRow> {
        remote.insert_note(draft).await
    }

    async fn remote_update(remote: &dyn RemoteStore, id: Uuid, patch: &NotePatch) -> PortResult<()> {
        remote.update_note(id, patch).await
    }

    async fn remote_delete(remote: &dyn RemoteStore, id: Uuid) -> PortResult<()> {
        remote.delete_note(id).await
    }
}

#[async_trait]
impl Tracked for StudyEvent {
    type Draft = NewEvent;
    type Row = EventRow;
    type Patch = EventPatch;

    const KIND: &'static str = "event";
    const DELETE_PROMPT: &'static str = "Delete this event?";

    fn provisional(temp: TempId, draft: &NewEvent) -> Self {
        Self {
            id: temp.into(),
            title: draft.title.clone(),
            date: draft.date,
            kind: draft.kind,
            subject_id: draft.subject_id,
        }
    }

    fn row_id(row: &EventRow) -> Uuid {
        row.id
    }

    fn confirm(&mut self, row: EventRow) {
        self.id = row.id.into();
    }

    fn queue(state: &mut State) -> &mut HashMap<TempId, Queued<Self>> {
        &mut state.queued_events
    }

    fn find_mut(state: &mut State, id: EntityId) -> Option<&mut Self> {
        let index = state.event_index(id)?;
        state.events.get_mut(index)
    }

    fn attach(state: &mut State, record: Self, index: Option<usize>) -> bool {
        insert_at(&mut state.events, index, record);
        true
    }

    fn detach(state: &mut State, id: EntityId) -> Option<Removed<Self>> {
        let index = state.event_index(id)?;
        let record = state.events.remove(index);
        Some(Removed {
            record,
            index,
            cleared_events: Vec::new(),
        })
    }

    async fn remote_insert(remote: &dyn RemoteStore, draft: &NewEvent) -> PortResult<EventRow> {
        remote.insert_event(draft).await
    }

    async fn remote_update(remote: &dyn RemoteStore, id: Uuid, patch: &EventPatch) -> PortResult<()> {
        remote.update_event(id, patch).await
    }

    async fn remote_delete(remote: &dyn RemoteStore, id: Uuid) -> PortResult<()> {
        remote.delete_event(id).await
    }
}

//=========================================================================================
// The Store
//=========================================================================================

struct Inner {
    remote: Arc<dyn RemoteStore>,
    alerts: Arc<dyn AlertSink>,
    next_temp: AtomicU64,
    state: Mutex<State>,
}

/// A cheaply cloneable handle to the shared study workspace.
#[derive(Clone)]
pub struct StudyStore {
    inner: Arc<Inner>,
}

enum Draft {
    Subject(NewSubject),
    Folder(NewFolder),
    Note(NewNote),
    Event(NewEvent),
}

/// A provisional record that is visible locally but not yet sent to the remote store.
#[must_use = "a staged record stays provisional until it is committed"]
pub struct Staged {
    store: StudyStore,
    temp: TempId,
    draft: Draft,
}

impl Staged {
    /// The temporary id the record is visible under until it is confirmed.
    pub fn id(&self) -> EntityId {
        EntityId::Provisional(self.temp)
    }

    /// Issues the remote create and reconciles the provisional record with the result.
    pub async fn commit(self) -> StoreResult<EntityId> {
        let Self { store, temp, draft } = self;
        match draft {
            Draft::Subject(draft) => store.commit_record::<Subject>(temp, draft).await,
            Draft::Folder(draft) => store.commit_record::<Folder>(temp, draft).await,
            Draft::Note(draft) => store.commit_record::<Note>(temp, draft).await,
            Draft::Event(draft) => store.commit_record::<StudyEvent>(temp, draft).await,
        }
    }
}

impl StudyStore {
    pub fn new(remote: Arc<dyn RemoteStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                alerts,
                next_temp: AtomicU64::new(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remote(&self) -> &dyn RemoteStore {
        self.inner.remote.as_ref()
    }

    /// Logs a failed remote call, tells the user, and wraps the error.
    fn fail(&self, action: &str, kind: &str, err: PortError) -> StoreError {
        error!(action, kind, error = %err, "remote call failed");
        self.inner
            .alerts
            .alert(&format!("Could not {action} {kind}: {err}"));
        StoreError::Remote(err)
    }

    //-------------------------------------------------------------------------------------
    // Reads
    //-------------------------------------------------------------------------------------

    /// Replaces local state with everything the remote store holds for this user.
    pub async fn load(&self) -> StoreResult<()> {
        let remote = self.remote();
        let (subjects, folders, notes, events) = futures::try_join!(
            remote.list_subjects(),
            remote.list_folders(),
            remote.list_notes(),
            remote.list_events()
        )
        .map_err(|err| self.fail("load", "workspace", err))?;

        let tree = assemble(subjects, folders, notes);
        let mut state = self.state();
        state.subjects = tree;
        state.events = events.into_iter().map(StudyEvent::from).collect();
        info!(
            subjects = state.subjects.len(),
            events = state.events.len(),
            "workspace loaded"
        );
        Ok(())
    }

    /// True while any create, or work queued behind one, is still unresolved.
    pub fn has_pending_writes(&self) -> bool {
        let state = self.state();
        !(state.queued_subjects.is_empty()
            && state.queued_folders.is_empty()
            && state.queued_notes.is_empty()
            && state.queued_events.is_empty())
    }

    /// Maps a reconciled temporary id to its confirmed id; other ids pass through.
    pub fn resolve(&self, id: EntityId) -> EntityId {
        self.state().resolve(id)
    }

    pub fn subjects(&self) -> Vec<Subject> {
        self.state().subjects.clone()
    }

    pub fn events(&self) -> Vec<StudyEvent> {
        self.state().events.clone()
    }

    /// Subjects whose name, or any folder name, contains `query`.
    pub fn search(&self, query: &str) -> Vec<Subject> {
        query::filter_subjects(&self.state().subjects, query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn subject(&self, id: EntityId) -> Option<Subject> {
        let state = self.state();
        let index = state.subject_index(state.resolve(id))?;
        Some(state.subjects[index].clone())
    }

    pub fn folder(&self, id: EntityId) -> Option<Folder> {
        let state = self.state();
        let (si, fi) = state.folder_path(state.resolve(id))?;
        Some(state.subjects[si].folders[fi].clone())
    }

    pub fn note(&self, id: EntityId) -> Option<Note> {
        let state = self.state();
        query::find_note(&state.subjects, state.resolve(id)).cloned()
    }

    pub fn event(&self, id: EntityId) -> Option<StudyEvent> {
        let state = self.state();
        let index = state.event_index(state.resolve(id))?;
        Some(state.events[index].clone())
    }

    //-------------------------------------------------------------------------------------
    // Subjects
    //-------------------------------------------------------------------------------------

    pub fn stage_subject(&self, name: &str) -> StoreResult<Staged> {
        let name = non_blank("subject name", name)?;
        let mut state = self.state();
        let color = SUBJECT_COLORS[state.subjects.len() % SUBJECT_COLORS.len()].to_string();
        let draft = NewSubject { name, color };
        let temp = self.attach_provisional::<Subject>(&mut state, &draft);
        drop(state);
        Ok(self.staged(temp, Draft::Subject(draft)))
    }

    pub async fn create_subject(&self, name: &str) -> StoreResult<EntityId> {
        self.stage_subject(name)?.commit().await
    }

    pub async fn update_subject(&self, id: EntityId, patch: SubjectPatch) -> StoreResult<Mutation> {
        self.update_record::<Subject>(id, patch).await
    }

    /// Deletes a subject with all of its folders and notes.
    pub async fn delete_subject(&self, id: EntityId, confirm: &dyn Confirm) -> StoreResult<Deletion> {
        self.delete_record::<Subject>(id, confirm).await
    }

    //-------------------------------------------------------------------------------------
    // Folders
    //-------------------------------------------------------------------------------------

    pub fn stage_folder(&self, subject_id: EntityId, name: &str) -> StoreResult<Staged> {
        let name = non_blank("folder name", name)?;
        let mut state = self.state();
        let subject_id = state.resolve(subject_id);
        if state.subject_index(subject_id).is_none() {
            return Err(StoreError::NotFound {
                kind: "subject",
                id: subject_id,
            });
        }
        let subject_id = subject_id.confirmed().ok_or(StoreError::ParentNotConfirmed {
            kind: "subject",
            id: subject_id,
        })?;
        let draft = NewFolder { subject_id, name };
        let temp = self.attach_provisional::<Folder>(&mut state, &draft);
        drop(state);
        Ok(self.staged(temp, Draft::Folder(draft)))
    }

    pub async fn create_folder(&self, subject_id: EntityId, name: &str) -> StoreResult<EntityId> {
        self.stage_folder(subject_id, name)?.commit().await
    }

    pub async fn update_folder(&self, id: EntityId, patch: FolderPatch) -> StoreResult<Mutation> {
        self.update_record::<Folder>(id, patch).await
    }

    /// Deletes a folder with all of its notes.
    pub async fn delete_folder(&self, id: EntityId, confirm: &dyn Confirm) -> StoreResult<Deletion> {
        self.delete_record::<Folder>(id, confirm).await
    }

    //-------------------------------------------------------------------------------------
    // Notes
    //-------------------------------------------------------------------------------------

    /// Stages an empty "Untitled Note" at the end of the folder.
    pub fn stage_note(&self, folder_id: EntityId) -> StoreResult<Staged> {
        let mut state = self.state();
        let folder_id = state.resolve(folder_id);
        if state.folder_path(folder_id).is_none() {
            return Err(StoreError::NotFound {
                kind: "folder",
                id: folder_id,
            });
        }
        let folder_id = folder_id.confirmed().ok_or(StoreError::ParentNotConfirmed {
            kind: "folder",
            id: folder_id,
        })?;
        let draft = NewNote {
            folder_id,
            title: UNTITLED_NOTE.to_string(),
            content: String::new(),
            created_at: Utc::now(),
        };
        let temp = self.attach_provisional::<Note>(&mut state, &draft);
        drop(state);
        Ok(self.staged(temp, Draft::Note(draft)))
    }

    pub async fn create_note(&self, folder_id: EntityId) -> StoreResult<EntityId> {
        self.stage_note(folder_id)?.commit().await
    }

    pub async fn update_note(&self, id: EntityId, patch: NotePatch) -> StoreResult<Mutation> {
        self.update_record::<Note>(id, patch).await
    }

    pub async fn delete_note(&self, id: EntityId, confirm: &dyn Confirm) -> StoreResult<Deletion> {
        self.delete_record::<Note>(id, confirm).await
    }

    /// Asks the assistant for a summary and saves it on the note.
    pub async fn summarize_note(
        &self,
        assistant: &dyn StudyAssistant,
        id: EntityId,
    ) -> StoreResult<String> {
        let content = self.note_content(id)?;
        let summary = assistant.summarize_note(&content).await.map_err(|err| {
            error!(note = %id, error = %err, "summarization failed");
            StoreError::Assistant(err)
        })?;
        let patch = NotePatch {
            summary: Some(Some(summary.clone())),
            ..NotePatch::default()
        };
        self.update_note(id, patch).await?;
        Ok(summary)
    }

    /// Asks the assistant for flashcards and replaces the note's current set.
    pub async fn generate_flashcards(
        &self,
        assistant: &dyn StudyAssistant,
        id: EntityId,
    ) -> StoreResult<Vec<Flashcard>> {
        let content = self.note_content(id)?;
        let cards = assistant.generate_flashcards(&content).await.map_err(|err| {
            error!(note = %id, error = %err, "flashcard generation failed");
            StoreError::Assistant(err)
        })?;

        let mut state = self.state();
        let id = state.resolve(id);
        let note = Note::find_mut(&mut state, id).ok_or(StoreError::NotFound { kind: "note", id })?;
        note.flashcards = cards.clone();
        debug!(note = %id, count = cards.len(), "flashcards replaced");
        Ok(cards)
    }

    fn note_content(&self, id: EntityId) -> StoreResult<String> {
        let mut state = self.state();
        let id = state.resolve(id);
        let note = Note::find_mut(&mut state, id).ok_or(StoreError::NotFound { kind: "note", id })?;
        if note.content.trim().is_empty() {
            return Err(StoreError::EmptyNote(id));
        }
        Ok(note.content.clone())
    }

    //-------------------------------------------------------------------------------------
    // Events
    //-------------------------------------------------------------------------------------

    pub fn stage_event(
        &self,
        title: &str,
        date: NaiveDate,
        kind: EventKind,
        subject_id: Option<EntityId>,
    ) -> StoreResult<Staged> {
        let title = non_blank("event title", title)?;
        let mut state = self.state();
        let subject_id = match subject_id {
            Some(id) => {
                let id = state.resolve(id);
                if state.subject_index(id).is_none() {
                    return Err(StoreError::NotFound { kind: "subject", id });
                }
                Some(id.confirmed().ok_or(StoreError::ParentNotConfirmed {
                    kind: "subject",
                    id,
                })?)
            }
            None => None,
        };
        let draft = NewEvent {
            title,
            date,
            kind,
            subject_id,
        };
        let temp = self.attach_provisional::<StudyEvent>(&mut state, &draft);
        drop(state);
        Ok(self.staged(temp, Draft::Event(draft)))
    }

    pub async fn create_event(
        &self,
        title: &str,
        date: NaiveDate,
        kind: EventKind,
        subject_id: Option<EntityId>,
    ) -> StoreResult<EntityId> {
        self.stage_event(title, date, kind, subject_id)?.commit().await
    }

    pub async fn update_event(&self, id: EntityId, patch: EventPatch) -> StoreResult<Mutation> {
        self.update_record::<StudyEvent>(id, patch).await
    }

    pub async fn delete_event(&self, id: EntityId, confirm: &dyn Confirm) -> StoreResult<Deletion> {
        self.delete_record::<StudyEvent>(id, confirm).await
    }

    //-------------------------------------------------------------------------------------
    // Generic Optimistic Flows
    //-------------------------------------------------------------------------------------

    fn staged(&self, temp: TempId, draft: Draft) -> Staged {
        Staged {
            store: self.clone(),
            temp,
            draft,
        }
    }

    fn attach_provisional<E: Tracked>(&self, state: &mut State, draft: &E::Draft) -> TempId {
        let temp = TempId::new(self.inner.next_temp.fetch_add(1, Ordering::Relaxed));
        let attached = E::attach(state, E::provisional(temp, draft), None);
        debug_assert!(attached, "parent was checked under the same lock");
        E::queue(state).insert(temp, Queued::default());
        debug!(kind = E::KIND, %temp, "staged provisional record");
        temp
    }

    async fn commit_record<E: Tracked>(&self, temp: TempId, draft: E::Draft) -> StoreResult<EntityId> {
        let row = match E::remote_insert(self.remote(), &draft).await {
            Ok(row) => row,
            Err(err) => {
                {
                    let mut state = self.state();
                    E::detach(&mut state, EntityId::Provisional(temp));
                    E::queue(&mut state).remove(&temp);
                }
                return Err(self.fail("create", E::KIND, err));
            }
        };

        let real = E::row_id(&row);
        let queued = {
            let mut state = self.state();
            state.aliases.insert(temp, real);
            let mut queued = E::queue(&mut state).remove(&temp).unwrap_or_default();
            match E::find_mut(&mut state, EntityId::Provisional(temp)) {
                Some(record) => record.confirm(row),
                None => match queued.removed.as_mut() {
                    Some(removed) => removed.record.confirm(row),
                    None => debug!(kind = E::KIND, %temp, "record left the workspace before confirmation"),
                },
            }
            queued
        };
        info!(kind = E::KIND, %temp, id = %real, "provisional record confirmed");

        self.replay::<E>(real, queued).await;
        Ok(EntityId::Confirmed(real))
    }

    /// Sends work queued against a provisional record to its confirmed row.
    async fn replay<E: Tracked>(&self, id: Uuid, queued: Queued<E>) {
        if let Some(removed) = queued.removed {
            if let Err(err) = E::remote_delete(self.remote(), id).await {
                {
                    let mut state = self.state();
                    E::reattach(&mut state, removed);
                    state.settle_restored();
                }
                self.fail("delete", E::KIND, err);
            }
            return;
        }

        let Some(patch) = queued.patch.filter(|patch| !patch.is_empty()) else {
            return;
        };
        debug!(kind = E::KIND, %id, "replaying queued update");
        if let Err(err) = E::remote_update(self.remote(), id, &patch).await {
            if let Some(undo) = queued.undo {
                let mut state = self.state();
                if let Some(record) = E::find_mut(&mut state, EntityId::Confirmed(id)) {
                    undo.apply(record);
                }
            }
            self.fail("update", E::KIND, err);
        }
    }

    async fn update_record<E: Tracked>(&self, id: EntityId, patch: E::Patch) -> StoreResult<Mutation> {
        let (target, undo) = {
            let mut state = self.state();
            let id = state.resolve(id);
            let record = E::find_mut(&mut state, id).ok_or(StoreError::NotFound { kind: E::KIND, id })?;
            if patch.is_empty() {
                return Ok(Mutation::Applied);
            }
            let undo = patch.inverse(record);
            patch.apply(record);

            match id {
                EntityId::Provisional(temp) => {
                    let queued = E::queue(&mut state).entry(temp).or_default();
                    queued.patch = Some(match queued.patch.take() {
                        Some(earlier) => earlier.merge(patch),
                        None => patch,
                    });
                    // The earliest undo holds the original values.
                    queued.undo = Some(match queued.undo.take() {
                        Some(earlier) => undo.merge(earlier),
                        None => undo,
                    });
                    debug!(kind = E::KIND, %temp, "update queued until create resolves");
                    return Ok(Mutation::Queued);
                }
                EntityId::Confirmed(target) => (target, undo),
            }
        };

        if let Err(err) = E::remote_update(self.remote(), target, &patch).await {
            {
                let mut state = self.state();
                if let Some(record) = E::find_mut(&mut state, EntityId::Confirmed(target)) {
                    undo.apply(record);
                }
            }
            return Err(self.fail("update", E::KIND, err));
        }
        Ok(Mutation::Applied)
    }

    async fn delete_record<E: Tracked>(&self, id: EntityId, confirm: &dyn Confirm) -> StoreResult<Deletion> {
        let id = {
            let mut state = self.state();
            let id = state.resolve(id);
            if E::find_mut(&mut state, id).is_none() {
                return Err(StoreError::NotFound { kind: E::KIND, id });
            }
            id
        };

        if !confirm.confirm(E::DELETE_PROMPT) {
            info!(kind = E::KIND, %id, "delete declined");
            return Ok(Deletion::Declined);
        }

        let (target, removed) = {
            let mut state = self.state();
            let removed = E::detach(&mut state, id).ok_or(StoreError::NotFound { kind: E::KIND, id })?;
            match id {
                EntityId::Provisional(temp) => {
                    E::queue(&mut state).entry(temp).or_default().removed = Some(removed);
                    debug!(kind = E::KIND, %temp, "delete queued until create resolves");
                    return Ok(Deletion::Queued);
                }
                EntityId::Confirmed(target) => (target, removed),
            }
        };

        if let Err(err) = E::remote_delete(self.remote(), target).await {
            {
                let mut state = self.state();
                E::reattach(&mut state, removed);
                state.settle_restored();
            }
            return Err(self.fail("delete", E::KIND, err));
        }
        info!(kind = E::KIND, id = %target, "deleted");
        Ok(Deletion::Deleted)
    }
}

fn non_blank(what: &'static str, value: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Blank(what));
    }
    Ok(trimmed.to_string())
}

/// Builds the nested subject tree from flat remote rows.
///
/// Rows keep their remote order. Folders and notes whose parent is missing are
/// dropped with a warning rather than attached somewhere arbitrary.
pub fn assemble(subjects: Vec<SubjectRow>, folders: Vec<FolderRow>, notes: Vec<NoteRow>) -> Vec<Subject> {
    let mut tree: Vec<Subject> = subjects.into_iter().map(Subject::from).collect();
    let mut folder_slots: HashMap<Uuid, (usize, usize)> = HashMap::new();

    for row in folders {
        let parent = EntityId::Confirmed(row.subject_id);
        match tree.iter().position(|s| s.id == parent) {
            Some(si) => {
                folder_slots.insert(row.id, (si, tree[si].folders.len()));
                tree[si].folders.push(row.into());
            }
            None => warn!(folder = %row.id, subject = %row.subject_id, "dropping folder with unknown subject"),
        }
    }

    for row in notes {
        match folder_slots.get(&row.folder_id) {
            Some(&(si, fi)) => tree[si].folders[fi].notes.push(row.into()),
            None => warn!(note = %row.id, folder = %row.folder_id, "dropping note with unknown folder"),
        }
    }

    tree
}
