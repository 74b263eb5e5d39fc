//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `RemoteStore` port from the core crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! `DbAdapter` owns the pool; `UserScopedStore` is the per-user view that the
//! workspace store talks to. Every statement it issues is filtered by the
//! user's id, so one user can never read or touch another user's rows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lumina_core::domain::{
    EventPatch, EventRow, FolderPatch, FolderRow, NewEvent, NewFolder, NewNote, NewSubject,
    NotePatch, NoteRow, SubjectPatch, SubjectRow,
};
use lumina_core::ports::{PortError, PortResult, RemoteStore};
use sqlx::postgres::PgQueryResult;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::RemoteFactory;

/// Postgres `insufficient_privilege`, raised by row-level security policies.
const INSUFFICIENT_PRIVILEGE: &str = "42501";
/// Postgres `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

//=========================================================================================
// The Main Adapter Structs
//=========================================================================================

/// Owns the connection pool and hands out user-scoped stores.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn for_user(&self, user_id: Uuid) -> UserScopedStore {
        UserScopedStore {
            pool: self.pool.clone(),
            user_id,
        }
    }
}

impl RemoteFactory for DbAdapter {
    fn remote_for(&self, user_id: Uuid) -> Arc<dyn RemoteStore> {
        Arc::new(self.for_user(user_id))
    }
}

/// A `RemoteStore` that only sees one user's rows.
#[derive(Clone)]
pub struct UserScopedStore {
    pool: PgPool,
    user_id: Uuid,
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SubjectRecord {
    id: Uuid,
    name: String,
    color: String,
}
impl SubjectRecord {
    fn to_domain(self) -> SubjectRow {
        SubjectRow {
            id: self.id,
            name: self.name,
            color: self.color,
        }
    }
}

#[derive(FromRow)]
struct FolderRecord {
    id: Uuid,
    subject_id: Uuid,
    name: String,
}
impl FolderRecord {
    fn to_domain(self) -> FolderRow {
        FolderRow {
            id: self.id,
            subject_id: self.subject_id,
            name: self.name,
        }
    }
}

#[derive(FromRow)]
struct NoteRecord {
    id: Uuid,
    folder_id: Uuid,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
    summary: Option<String>,
}
impl NoteRecord {
    fn to_domain(self) -> NoteRow {
        NoteRow {
            id: self.id,
            folder_id: self.folder_id,
            title: self.title,
            content: self.content,
            created_at: self.created_at,
            summary: self.summary,
        }
    }
}

#[derive(FromRow)]
struct EventRecord {
    id: Uuid,
    title: String,
    date: NaiveDate,
    #[sqlx(rename = "type")]
    kind: String,
    subject_id: Option<Uuid>,
}
impl EventRecord {
    fn to_domain(self) -> PortResult<EventRow> {
        let kind = self.kind.parse().map_err(PortError::Unexpected)?;
        Ok(EventRow {
            id: self.id,
            title: self.title,
            date: self.date,
            kind,
            subject_id: self.subject_id,
        })
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn map_db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(INSUFFICIENT_PRIVILEGE) => return PortError::AccessDenied(db.message().to_string()),
            Some(FOREIGN_KEY_VIOLATION) => return PortError::NotFound(db.message().to_string()),
            _ => {}
        }
    }
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

/// Zero affected rows means the record is gone or belongs to someone else.
fn expect_row(result: PgQueryResult, kind: &str, id: Uuid) -> PortResult<()> {
    if result.rows_affected() == 0 {
        return Err(PortError::NotFound(format!("{kind} {id} not found")));
    }
    Ok(())
}

//=========================================================================================
// `RemoteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteStore for UserScopedStore {
    // --- Subjects ---

    async fn list_subjects(&self) -> PortResult<Vec<SubjectRow>> {
        let records = sqlx::query_as::<_, SubjectRecord>(
            "SELECT id, name, color FROM subjects WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(records.into_iter().map(SubjectRecord::to_domain).collect())
    }

    async fn insert_subject(&self, draft: &NewSubject) -> PortResult<SubjectRow> {
        let record = sqlx::query_as::<_, SubjectRecord>(
            "INSERT INTO subjects (name, color, user_id) VALUES ($1, $2, $3)
             RETURNING id, name, color",
        )
        .bind(&draft.name)
        .bind(&draft.color)
        .bind(self.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        debug!(subject_id = %record.id, "inserted subject");
        Ok(record.to_domain())
    }

    async fn update_subject(&self, id: Uuid, patch: &SubjectPatch) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE subjects SET name = COALESCE($1, name), color = COALESCE($2, color)
             WHERE id = $3 AND user_id = $4",
        )
        .bind(&patch.name)
        .bind(&patch.color)
        .bind(id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        expect_row(result, "subject", id)
    }

    async fn delete_subject(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM subjects WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        expect_row(result, "subject", id)
    }

    // --- Folders ---

    async fn list_folders(&self) -> PortResult<Vec<FolderRow>> {
        let records = sqlx::query_as::<_, FolderRecord>(
            "SELECT id, subject_id, name FROM folders WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(records.into_iter().map(FolderRecord::to_domain).collect())
    }

    async fn insert_folder(&self, draft: &NewFolder) -> PortResult<FolderRow> {
        // The parent must belong to the same user.
        let record = sqlx::query_as::<_, FolderRecord>(
            "INSERT INTO folders (subject_id, name, user_id)
             SELECT $1, $2, $3
             WHERE EXISTS (SELECT 1 FROM subjects WHERE id = $1 AND user_id = $3)
             RETURNING id, subject_id, name",
        )
        .bind(draft.subject_id)
        .bind(&draft.name)
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| PortError::NotFound(format!("subject {} not found", draft.subject_id)))?;

        Ok(record.to_domain())
    }

    async fn update_folder(&self, id: Uuid, patch: &FolderPatch) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE folders SET name = COALESCE($1, name) WHERE id = $2 AND user_id = $3",
        )
        .bind(&patch.name)
        .bind(id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        expect_row(result, "folder", id)
    }

    async fn delete_folder(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM folders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        expect_row(result, "folder", id)
    }

    // --- Notes ---

    async fn list_notes(&self) -> PortResult<Vec<NoteRow>> {
        let records = sqlx::query_as::<_, NoteRecord>(
            "SELECT id, folder_id, title, content, created_at, summary
             FROM notes WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(records.into_iter().map(NoteRecord::to_domain).collect())
    }

    async fn insert_note(&self, draft: &NewNote) -> PortResult<NoteRow> {
        // `created_at` comes from the server clock.
        let record = sqlx::query_as::<_, NoteRecord>(
            "INSERT INTO notes (folder_id, title, content, user_id)
             SELECT $1, $2, $3, $4
             WHERE EXISTS (SELECT 1 FROM folders WHERE id = $1 AND user_id = $4)
             RETURNING id, folder_id, title, content, created_at, summary",
        )
        .bind(draft.folder_id)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| PortError::NotFound(format!("folder {} not found", draft.folder_id)))?;

        debug!(note_id = %record.id, "inserted note");
        Ok(record.to_domain())
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE notes SET
                 title = COALESCE($1, title),
                 content = COALESCE($2, content),
                 summary = CASE WHEN $3 THEN $4 ELSE summary END
             WHERE id = $5 AND user_id = $6",
        )
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(patch.summary.is_some())
        .bind(patch.summary.clone().flatten())
        .bind(id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        expect_row(result, "note", id)
    }

    async fn delete_note(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        expect_row(result, "note", id)
    }

    // --- Events ---

    async fn list_events(&self) -> PortResult<Vec<EventRow>> {
        let records = sqlx::query_as::<_, EventRecord>(
            "SELECT id, title, date, type, subject_id
             FROM events WHERE user_id = $1 ORDER BY date, created_at",
        )
        .bind(self.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        records.into_iter().map(EventRecord::to_domain).collect()
    }

    async fn insert_event(&self, draft: &NewEvent) -> PortResult<EventRow> {
        let record = sqlx::query_as::<_, EventRecord>(
            "INSERT INTO events (title, date, type, subject_id, user_id)
             SELECT $1, $2, $3, $4, $5
             WHERE $4::uuid IS NULL
                OR EXISTS (SELECT 1 FROM subjects WHERE id = $4 AND user_id = $5)
             RETURNING id, title, date, type, subject_id",
        )
        .bind(&draft.title)
        .bind(draft.date)
        .bind(draft.kind.as_str())
        .bind(draft.subject_id)
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| PortError::NotFound("event subject not found".to_string()))?;

        record.to_domain()
    }

    async fn update_event(&self, id: Uuid, patch: &EventPatch) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE events SET
                 title = COALESCE($1, title),
                 date = COALESCE($2, date),
                 type = COALESCE($3, type),
                 subject_id = CASE WHEN $4 THEN $5 ELSE subject_id END
             WHERE id = $6 AND user_id = $7",
        )
        .bind(&patch.title)
        .bind(patch.date)
        .bind(patch.kind.map(|kind| kind.as_str()))
        .bind(patch.subject_id.is_some())
        .bind(patch.subject_id.flatten())
        .bind(id)
        .bind(self.user_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        expect_row(result, "event", id)
    }

    async fn delete_event(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        expect_row(result, "event", id)
    }
}
