//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Creates answer `202 Accepted` with the provisional record while the remote
//! insert finishes in the background. Updates answer `200` once the remote
//! write landed, or `202` when the target is still provisional and the change
//! is queued. Background failures surface through `GET /alerts`.

use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use chrono::{Datelike, NaiveDate};
use lumina_core::query::{self, CalendarMonth};
use lumina_core::{
    ChatMessage, Confirm, Deletion, EntityId, EventKind, EventPatch, Flashcard, Folder, FolderPatch,
    Mutation, Note, NotePatch, Preferences, PreferenceStore, Staged, StudyEvent, Subject,
    StoreError, SubjectPatch,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::UserId;
use crate::web::state::AppState;

/// How many notes and events the dashboard lists.
const DASHBOARD_LIMIT: usize = 3;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_workspace,
        get_dashboard,
        create_subject,
        update_subject,
        delete_subject,
        create_folder,
        update_folder,
        delete_folder,
        create_note,
        update_note,
        delete_note,
        summarize_note,
        generate_flashcards,
        list_events,
        create_event,
        update_event,
        delete_event,
        get_calendar,
        chat,
        chat_history,
        clear_chat,
        study_plan,
        drain_alerts,
        get_preferences,
        put_preferences,
    ),
    components(
        schemas(
            NameRequest, SubjectUpdate, FolderUpdate, NoteUpdate, EventRequest, EventUpdate,
            ChatRequest, StudyPlanRequest, StudyPlanResponse, SummaryResponse, WorkspaceView,
            DashboardView, SubjectSummary, CalendarView, ChatReply, PreferencesBody,
        )
    ),
    tags(
        (name = "Lumina API", description = "Study workspace, calendar and assistant endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize, IntoParams)]
pub struct SearchParams {
    /// Case-insensitive filter over subject and folder names.
    pub q: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct ConfirmParams {
    /// Must be `true` for the delete to go ahead.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct DateParams {
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubjectUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct FolderUpdate {
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub title: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    #[schema(value_type = String, example = "exam")]
    pub kind: EventKind,
    #[schema(value_type = Option<String>)]
    pub subject_id: Option<EntityId>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(rename = "type")]
    #[schema(value_type = Option<String>)]
    pub kind: Option<EventKind>,
    /// `null` detaches the event from its subject; omitting it leaves the link alone.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub subject_id: Option<Option<EntityId>>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    /// The note currently open, used as context for the question.
    #[schema(value_type = Option<String>)]
    pub note_id: Option<EntityId>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatReply {
    /// `null` when the message was blank and nothing was sent.
    #[schema(value_type = Option<Object>)]
    pub reply: Option<ChatMessage>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlanRequest {
    pub exam_date: NaiveDate,
    pub topics: Vec<String>,
}

/// The stored display settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesBody {
    pub dark_mode: bool,
    pub compact_view: bool,
}

impl From<Preferences> for PreferencesBody {
    fn from(preferences: Preferences) -> Self {
        Self {
            dark_mode: preferences.dark_mode,
            compact_view: preferences.compact_view,
        }
    }
}

impl From<PreferencesBody> for Preferences {
    fn from(body: PreferencesBody) -> Self {
        Self {
            dark_mode: body.dark_mode,
            compact_view: body.compact_view,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StudyPlanResponse {
    pub plan: String,
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    pub summary: String,
}

#[derive(Serialize, ToSchema)]
pub struct WorkspaceView {
    #[schema(value_type = Vec<Object>)]
    pub subjects: Vec<Subject>,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<StudyEvent>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    #[schema(value_type = String)]
    pub id: EntityId,
    pub name: String,
    pub color: String,
    pub folder_count: usize,
    pub note_count: usize,
}

impl From<&Subject> for SubjectSummary {
    fn from(subject: &Subject) -> Self {
        Self {
            id: subject.id,
            name: subject.name.clone(),
            color: subject.color.clone(),
            folder_count: subject.folders.len(),
            note_count: subject.folders.iter().map(|f| f.notes.len()).sum(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub subjects: Vec<SubjectSummary>,
    #[schema(value_type = Vec<Object>)]
    pub recent_notes: Vec<Note>,
    #[schema(value_type = Vec<Object>)]
    pub upcoming_events: Vec<StudyEvent>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    #[schema(value_type = Object)]
    pub month: CalendarMonth,
    #[schema(value_type = Option<Object>)]
    pub previous: Option<CalendarMonth>,
    #[schema(value_type = Option<Object>)]
    pub next: Option<CalendarMonth>,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<StudyEvent>,
}

/// Keeps `null` distinct from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

//=========================================================================================
// Shared Helpers
//=========================================================================================

/// Answers the store's confirmation prompt from the `confirm` query flag and
/// remembers the prompt so a refusal can tell the client what to confirm.
struct QueryConfirm {
    confirmed: bool,
    prompt: Mutex<Option<String>>,
}

impl QueryConfirm {
    fn new(params: &ConfirmParams) -> Self {
        Self {
            confirmed: params.confirm,
            prompt: Mutex::new(None),
        }
    }

    fn respond(self, outcome: Deletion) -> Response {
        match outcome {
            Deletion::Deleted => StatusCode::NO_CONTENT.into_response(),
            Deletion::Queued => StatusCode::ACCEPTED.into_response(),
            Deletion::Declined => {
                let prompt = self.prompt.into_inner().unwrap_or_else(PoisonError::into_inner);
                (
                    StatusCode::PRECONDITION_REQUIRED,
                    Json(json!({ "error": "confirmation required", "prompt": prompt })),
                )
                    .into_response()
            }
        }
    }
}

impl Confirm for QueryConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        *self.prompt.lock().unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());
        self.confirmed
    }
}

fn mutation_status(outcome: Mutation) -> StatusCode {
    match outcome {
        Mutation::Applied => StatusCode::OK,
        Mutation::Queued => StatusCode::ACCEPTED,
    }
}

/// Finishes a staged create in the background. Failures are already
/// rolled back and alerted by the store.
fn spawn_commit(staged: Staged) {
    tokio::spawn(async move {
        let temp = staged.id();
        match staged.commit().await {
            Ok(id) => info!(%temp, %id, "create committed"),
            Err(e) => warn!(%temp, error = %e, "create failed"),
        }
    });
}

fn vanished(id: EntityId) -> ApiError {
    ApiError::Internal(format!("record {id} disappeared before it could be returned"))
}

//=========================================================================================
// Workspace and Dashboard
//=========================================================================================

/// The user's subjects (optionally filtered) and every event.
#[utoipa::path(
    get,
    path = "/workspace",
    params(SearchParams, ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 200, description = "Workspace contents", body = WorkspaceView),
        (status = 401, description = "Missing or invalid x-user-id header")
    )
)]
pub async fn get_workspace(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Query(params): Query<SearchParams>,
) -> Result<Json<WorkspaceView>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let subjects = match params.q.as_deref() {
        Some(q) => ws.store.search(q),
        None => ws.store.subjects(),
    };
    Ok(Json(WorkspaceView {
        subjects,
        events: ws.store.events(),
    }))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses((status = 200, description = "Dashboard overview", body = DashboardView))
)]
pub async fn get_dashboard(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<Json<DashboardView>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let subjects = ws.store.subjects();
    let events = ws.store.events();
    Ok(Json(DashboardView {
        subjects: subjects.iter().map(SubjectSummary::from).collect(),
        recent_notes: query::recent_notes(&subjects, DASHBOARD_LIMIT)
            .into_iter()
            .cloned()
            .collect(),
        upcoming_events: query::upcoming_events(&events, DASHBOARD_LIMIT)
            .into_iter()
            .cloned()
            .collect(),
    }))
}

//=========================================================================================
// Subjects
//=========================================================================================

#[utoipa::path(
    post,
    path = "/subjects",
    request_body = NameRequest,
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user.")),
    responses(
        (status = 202, description = "Subject created locally; remote insert in progress"),
        (status = 400, description = "Blank name")
    )
)]
pub async fn create_subject(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<NameRequest>,
) -> Result<(StatusCode, Json<Subject>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let staged = ws.store.stage_subject(&body.name)?;
    let subject = ws.store.subject(staged.id()).ok_or_else(|| vanished(staged.id()))?;
    spawn_commit(staged);
    Ok((StatusCode::ACCEPTED, Json(subject)))
}

#[utoipa::path(
    patch,
    path = "/subjects/{id}",
    request_body = SubjectUpdate,
    params(("id" = String, Path, description = "Confirmed or provisional subject id")),
    responses(
        (status = 200, description = "Updated"),
        (status = 202, description = "Queued until the subject is confirmed"),
        (status = 404, description = "No such subject")
    )
)]
pub async fn update_subject(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Json(body): Json<SubjectUpdate>,
) -> Result<(StatusCode, Json<Subject>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let patch = SubjectPatch {
        name: body.name,
        color: body.color,
    };
    let outcome = ws.store.update_subject(id, patch).await?;
    let subject = ws.store.subject(id).ok_or_else(|| vanished(id))?;
    Ok((mutation_status(outcome), Json(subject)))
}

#[utoipa::path(
    delete,
    path = "/subjects/{id}",
    params(ConfirmParams, ("id" = String, Path, description = "Subject id")),
    responses(
        (status = 204, description = "Deleted with its folders and notes"),
        (status = 202, description = "Queued until the subject is confirmed"),
        (status = 428, description = "Not confirmed")
    )
)]
pub async fn delete_subject(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Query(params): Query<ConfirmParams>,
) -> Result<Response, ApiError> {
    let ws = app.workspace(user_id).await?;
    let gate = QueryConfirm::new(&params);
    let outcome = ws.store.delete_subject(id, &gate).await?;
    Ok(gate.respond(outcome))
}

//=========================================================================================
// Folders
//=========================================================================================

#[utoipa::path(
    post,
    path = "/subjects/{id}/folders",
    request_body = NameRequest,
    params(("id" = String, Path, description = "Parent subject id")),
    responses(
        (status = 202, description = "Folder created locally; remote insert in progress"),
        (status = 409, description = "The subject has not been confirmed yet")
    )
)]
pub async fn create_folder(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(subject_id): Path<EntityId>,
    Json(body): Json<NameRequest>,
) -> Result<(StatusCode, Json<Folder>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let staged = ws.store.stage_folder(subject_id, &body.name)?;
    let folder = ws.store.folder(staged.id()).ok_or_else(|| vanished(staged.id()))?;
    spawn_commit(staged);
    Ok((StatusCode::ACCEPTED, Json(folder)))
}

#[utoipa::path(
    patch,
    path = "/folders/{id}",
    request_body = FolderUpdate,
    params(("id" = String, Path, description = "Confirmed or provisional folder id")),
    responses(
        (status = 200, description = "Updated"),
        (status = 202, description = "Queued until the folder is confirmed"),
        (status = 404, description = "No such folder")
    )
)]
pub async fn update_folder(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Json(body): Json<FolderUpdate>,
) -> Result<(StatusCode, Json<Folder>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let outcome = ws.store.update_folder(id, FolderPatch { name: body.name }).await?;
    let folder = ws.store.folder(id).ok_or_else(|| vanished(id))?;
    Ok((mutation_status(outcome), Json(folder)))
}

#[utoipa::path(
    delete,
    path = "/folders/{id}",
    params(ConfirmParams, ("id" = String, Path, description = "Folder id")),
    responses(
        (status = 204, description = "Deleted with its notes"),
        (status = 202, description = "Queued until the folder is confirmed"),
        (status = 428, description = "Not confirmed")
    )
)]
pub async fn delete_folder(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Query(params): Query<ConfirmParams>,
) -> Result<Response, ApiError> {
    let ws = app.workspace(user_id).await?;
    let gate = QueryConfirm::new(&params);
    let outcome = ws.store.delete_folder(id, &gate).await?;
    Ok(gate.respond(outcome))
}

//=========================================================================================
// Notes
//=========================================================================================

/// Creates an untitled, empty note in the folder.
#[utoipa::path(
    post,
    path = "/folders/{id}/notes",
    params(("id" = String, Path, description = "Parent folder id")),
    responses((status = 202, description = "Note created locally; remote insert in progress"))
)]
pub async fn create_note(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(folder_id): Path<EntityId>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let staged = ws.store.stage_note(folder_id)?;
    let note = ws.store.note(staged.id()).ok_or_else(|| vanished(staged.id()))?;
    spawn_commit(staged);
    Ok((StatusCode::ACCEPTED, Json(note)))
}

#[utoipa::path(
    patch,
    path = "/notes/{id}",
    request_body = NoteUpdate,
    params(("id" = String, Path, description = "Confirmed or provisional note id")),
    responses(
        (status = 200, description = "Updated"),
        (status = 202, description = "Queued until the note is confirmed")
    )
)]
pub async fn update_note(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Json(body): Json<NoteUpdate>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let patch = NotePatch {
        title: body.title,
        content: body.content,
        summary: None,
    };
    let outcome = ws.store.update_note(id, patch).await?;
    let note = ws.store.note(id).ok_or_else(|| vanished(id))?;
    Ok((mutation_status(outcome), Json(note)))
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(ConfirmParams, ("id" = String, Path, description = "Note id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 202, description = "Queued until the note is confirmed"),
        (status = 428, description = "Not confirmed")
    )
)]
pub async fn delete_note(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Query(params): Query<ConfirmParams>,
) -> Result<Response, ApiError> {
    let ws = app.workspace(user_id).await?;
    let gate = QueryConfirm::new(&params);
    let outcome = ws.store.delete_note(id, &gate).await?;
    Ok(gate.respond(outcome))
}

#[utoipa::path(
    post,
    path = "/notes/{id}/summary",
    params(("id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "Summary generated and saved", body = SummaryResponse),
        (status = 400, description = "The note has no content"),
        (status = 502, description = "The assistant failed")
    )
)]
pub async fn summarize_note(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let summary = ws.store.summarize_note(app.assistant.as_ref(), id).await?;
    Ok(Json(SummaryResponse { summary }))
}

#[utoipa::path(
    post,
    path = "/notes/{id}/flashcards",
    params(("id" = String, Path, description = "Note id")),
    responses(
        (status = 200, description = "Generated cards; empty when the model output was unusable"),
        (status = 400, description = "The note has no content")
    )
)]
pub async fn generate_flashcards(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
) -> Result<Json<Vec<Flashcard>>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let cards = ws.store.generate_flashcards(app.assistant.as_ref(), id).await?;
    Ok(Json(cards))
}

//=========================================================================================
// Events and Calendar
//=========================================================================================

/// Every event in date order, or only those on `date`.
#[utoipa::path(
    get,
    path = "/events",
    params(DateParams),
    responses((status = 200, description = "Events"))
)]
pub async fn list_events(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Query(params): Query<DateParams>,
) -> Result<Json<Vec<StudyEvent>>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let events = ws.store.events();
    let selected: Vec<StudyEvent> = match params.date {
        Some(date) => query::events_on(&events, date).into_iter().cloned().collect(),
        None => query::upcoming_events(&events, events.len())
            .into_iter()
            .cloned()
            .collect(),
    };
    Ok(Json(selected))
}

#[utoipa::path(
    post,
    path = "/events",
    request_body = EventRequest,
    responses(
        (status = 202, description = "Event created locally; remote insert in progress"),
        (status = 409, description = "The linked subject has not been confirmed yet")
    )
)]
pub async fn create_event(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<EventRequest>,
) -> Result<(StatusCode, Json<StudyEvent>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let staged = ws
        .store
        .stage_event(&body.title, body.date, body.kind, body.subject_id)?;
    let event = ws.store.event(staged.id()).ok_or_else(|| vanished(staged.id()))?;
    spawn_commit(staged);
    Ok((StatusCode::ACCEPTED, Json(event)))
}

/// `subjectId: null` detaches the event; omitting `subjectId` keeps the link.
#[utoipa::path(
    patch,
    path = "/events/{id}",
    request_body = EventUpdate,
    params(("id" = String, Path, description = "Confirmed or provisional event id")),
    responses(
        (status = 200, description = "Updated"),
        (status = 202, description = "Queued until the event is confirmed"),
        (status = 409, description = "The new subject has not been confirmed yet")
    )
)]
pub async fn update_event(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Json(body): Json<EventUpdate>,
) -> Result<(StatusCode, Json<StudyEvent>), ApiError> {
    let ws = app.workspace(user_id).await?;
    let subject_id = match body.subject_id {
        Some(Some(subject)) => {
            let resolved = ws.store.resolve(subject);
            let uuid = resolved.confirmed().ok_or(ApiError::Store(
                StoreError::ParentNotConfirmed {
                    kind: "subject",
                    id: resolved,
                },
            ))?;
            Some(Some(uuid))
        }
        Some(None) => Some(None),
        None => None,
    };
    let patch = EventPatch {
        title: body.title,
        date: body.date,
        kind: body.kind,
        subject_id,
    };
    let outcome = ws.store.update_event(id, patch).await?;
    let event = ws.store.event(id).ok_or_else(|| vanished(id))?;
    Ok((mutation_status(outcome), Json(event)))
}

#[utoipa::path(
    delete,
    path = "/events/{id}",
    params(ConfirmParams, ("id" = String, Path, description = "Event id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 202, description = "Queued until the event is confirmed"),
        (status = 428, description = "Not confirmed")
    )
)]
pub async fn delete_event(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<EntityId>,
    Query(params): Query<ConfirmParams>,
) -> Result<Response, ApiError> {
    let ws = app.workspace(user_id).await?;
    let gate = QueryConfirm::new(&params);
    let outcome = ws.store.delete_event(id, &gate).await?;
    Ok(gate.respond(outcome))
}

/// Layout and events for one calendar month.
#[utoipa::path(
    get,
    path = "/calendar/{year}/{month}",
    params(
        ("year" = i32, Path, description = "Four-digit year"),
        ("month" = u32, Path, description = "Month, 1 to 12")
    ),
    responses(
        (status = 200, description = "Month layout and its events", body = CalendarView),
        (status = 400, description = "No such month")
    )
)]
pub async fn get_calendar(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<CalendarView>, ApiError> {
    let grid = CalendarMonth::new(year, month)
        .ok_or_else(|| ApiError::BadRequest(format!("{year}-{month} is not a calendar month")))?;
    let ws = app.workspace(user_id).await?;
    let mut events: Vec<StudyEvent> = ws
        .store
        .events()
        .into_iter()
        .filter(|e| e.date.year() == year && e.date.month() == month)
        .collect();
    events.sort_by_key(|e| e.date);
    Ok(Json(CalendarView {
        month: grid,
        previous: grid.prev(),
        next: grid.next(),
        events,
    }))
}

//=========================================================================================
// Assistant
//=========================================================================================

/// Sends one chat turn, optionally grounded in the open note.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses((status = 200, description = "The assistant's reply", body = ChatReply))
)]
pub async fn chat(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let note = match body.note_id {
        Some(id) => Some(ws.store.note(id).ok_or(ApiError::Store(
            StoreError::NotFound { kind: "note", id },
        ))?),
        None => None,
    };
    let mut session = ws.chat.lock().await;
    let reply = session
        .send(app.assistant.as_ref(), &body.message, note.as_ref())
        .await
        .cloned();
    Ok(Json(ChatReply { reply }))
}

#[utoipa::path(
    get,
    path = "/chat",
    responses((status = 200, description = "Every message of the session, oldest first"))
)]
pub async fn chat_history(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let ws = app.workspace(user_id).await?;
    let session = ws.chat.lock().await;
    Ok(Json(session.messages().to_vec()))
}

#[utoipa::path(
    delete,
    path = "/chat",
    responses((status = 204, description = "History cleared"))
)]
pub async fn clear_chat(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<StatusCode, ApiError> {
    let ws = app.workspace(user_id).await?;
    ws.chat.lock().await.clear();
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/study-plan",
    request_body = StudyPlanRequest,
    responses(
        (status = 200, description = "A day-by-day plan", body = StudyPlanResponse),
        (status = 400, description = "No topics given"),
        (status = 502, description = "The assistant failed")
    )
)]
pub async fn study_plan(
    State(app): State<Arc<AppState>>,
    Json(body): Json<StudyPlanRequest>,
) -> Result<Json<StudyPlanResponse>, ApiError> {
    let topics: Vec<String> = body
        .topics
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if topics.is_empty() {
        return Err(ApiError::BadRequest("at least one topic is required".to_string()));
    }
    let plan = app.assistant.create_study_plan(body.exam_date, &topics).await?;
    Ok(Json(StudyPlanResponse { plan }))
}

//=========================================================================================
// Alerts and Preferences
//=========================================================================================

/// Returns and clears the user's pending failure alerts.
#[utoipa::path(
    get,
    path = "/alerts",
    responses((status = 200, description = "Pending alert messages, oldest first", body = Vec<String>))
)]
pub async fn drain_alerts(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<Json<Vec<String>>, ApiError> {
    let ws = app.workspace(user_id).await?;
    Ok(Json(ws.alerts.drain()))
}

/// Reads the user's settings, falling back to defaults when none are saved.
#[utoipa::path(
    get,
    path = "/preferences",
    responses((status = 200, description = "Current settings", body = PreferencesBody))
)]
pub async fn get_preferences(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<Json<PreferencesBody>, ApiError> {
    let store = app.preferences(user_id);
    let preferences = tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| ApiError::Internal(format!("preferences task failed: {e}")))??
        .unwrap_or_default();
    Ok(Json(preferences.into()))
}

#[utoipa::path(
    put,
    path = "/preferences",
    request_body = PreferencesBody,
    responses((status = 200, description = "Saved settings", body = PreferencesBody))
)]
pub async fn put_preferences(
    State(app): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<PreferencesBody>,
) -> Result<Json<PreferencesBody>, ApiError> {
    let store = app.preferences(user_id);
    let preferences = Preferences::from(body);
    tokio::task::spawn_blocking(move || store.save(&preferences))
        .await
        .map_err(|e| ApiError::Internal(format!("preferences task failed: {e}")))??;
    info!(%user_id, dark_mode = body.dark_mode, "preferences saved");
    Ok(Json(body))
}
