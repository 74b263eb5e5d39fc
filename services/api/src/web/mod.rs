pub mod middleware;
pub mod rest;
pub mod state;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};

pub use middleware::{require_user, UserId, USER_HEADER};
pub use state::{AlertQueue, AppState, Workspace};

use rest::*;

/// Builds every route of the service. All routes require a user id.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/workspace", get(get_workspace))
        .route("/dashboard", get(get_dashboard))
        .route("/subjects", post(create_subject))
        .route("/subjects/{id}", patch(update_subject).delete(delete_subject))
        .route("/subjects/{id}/folders", post(create_folder))
        .route("/folders/{id}", patch(update_folder).delete(delete_folder))
        .route("/folders/{id}/notes", post(create_note))
        .route("/notes/{id}", patch(update_note).delete(delete_note))
        .route("/notes/{id}/summary", post(summarize_note))
        .route("/notes/{id}/flashcards", post(generate_flashcards))
        .route("/events", get(list_events).post(create_event))
        .route("/events/{id}", patch(update_event).delete(delete_event))
        .route("/calendar/{year}/{month}", get(get_calendar))
        .route("/chat", get(chat_history).post(chat).delete(clear_chat))
        .route("/study-plan", post(study_plan))
        .route("/alerts", get(drain_alerts))
        .route("/preferences", get(get_preferences).put(put_preferences))
        .layer(axum_middleware::from_fn(require_user))
        .with_state(app_state)
}
