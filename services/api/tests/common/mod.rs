#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use lumina_api::adapters::InMemoryRemotes;
use lumina_api::config::Config;
use lumina_api::web::{build_router, AppState, USER_HEADER};
use lumina_core::{ChatMessage, Flashcard, PortResult, StudyAssistant};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

/// Answers every prompt by echoing it back.
pub struct EchoAssistant;

#[async_trait]
impl StudyAssistant for EchoAssistant {
    async fn chat(&self, message: &str, history: &[ChatMessage]) -> PortResult<String> {
        Ok(format!("echo #{}: {message}", history.len()))
    }

    async fn summarize_note(&self, content: &str) -> PortResult<String> {
        Ok(format!("summary of {} chars", content.len()))
    }

    async fn generate_flashcards(&self, _content: &str) -> PortResult<Vec<Flashcard>> {
        Ok(vec![Flashcard {
            question: "What is a cell?".into(),
            answer: "The basic unit of life.".into(),
        }])
    }

    async fn create_study_plan(&self, exam_date: NaiveDate, topics: &[String]) -> PortResult<String> {
        Ok(format!("Plan for {exam_date}: {}", topics.join(" / ")))
    }
}

pub fn app(preferences_dir: &Path) -> Router {
    harness(preferences_dir).router
}

/// The router together with the state and rows behind it.
pub struct Harness {
    pub router: Router,
    pub state: Arc<AppState>,
    pub remotes: Arc<InMemoryRemotes>,
}

pub fn harness(preferences_dir: &Path) -> Harness {
    let mut config = Config::from_lookup(|_| None).unwrap();
    config.preferences_dir = preferences_dir.to_path_buf();
    let remotes = Arc::new(InMemoryRemotes::default());
    let state = Arc::new(AppState::new(
        Arc::new(config),
        remotes.clone(),
        Arc::new(EchoAssistant),
    ));
    Harness {
        router: build_router(state.clone()),
        state,
        remotes,
    }
}

pub async fn send(
    app: &Router,
    user: Uuid,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, user.to_string());
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Polls the workspace until no subject is still provisional.
pub async fn settle(app: &Router, user: Uuid) -> Value {
    for _ in 0..50 {
        let (_, workspace) = send(app, user, "GET", "/workspace", None).await;
        let pending = workspace["subjects"]
            .as_array()
            .map(|subjects| {
                subjects
                    .iter()
                    .any(|s| s["id"].as_str().is_some_and(|id| id.starts_with("tmp-")))
            })
            .unwrap_or(false);
        if !pending {
            return workspace;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("subjects never left the provisional state");
}
