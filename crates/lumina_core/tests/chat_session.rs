mod common;

use chrono::Utc;
use common::CannedAssistant;
use lumina_core::chat::{EMPTY_REPLY, FAILED_REPLY};
use lumina_core::{ChatSession, EntityId, Note, Role, TempId};
use uuid::Uuid;

fn note() -> Note {
    Note {
        id: EntityId::Provisional(TempId::new(7)),
        folder_id: Uuid::new_v4(),
        title: "Photosynthesis".into(),
        content: "Light reactions happen in the thylakoid.".into(),
        created_at: Utc::now(),
        summary: None,
        flashcards: Vec::new(),
    }
}

#[tokio::test]
async fn replies_are_appended_and_history_is_passed_along() {
    let assistant = CannedAssistant::replying("Chlorophyll absorbs light.");
    let mut session = ChatSession::new();

    session.send(&assistant, "What absorbs light?", None).await.unwrap();
    session.send(&assistant, "And then?", Some(&note())).await.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].text, "Chlorophyll absorbs light.");

    let prompts = assistant.prompts.lock().unwrap();
    assert!(prompts[0].1.is_empty());
    assert_eq!(prompts[1].1.len(), 2);
    assert_eq!(
        prompts[1].0,
        "And then?\n\n[Context from current note: \"Photosynthesis\"]: Light reactions happen in the thylakoid."
    );
    // The history keeps what the user typed, not the grounded prompt.
    assert_eq!(messages[2].text, "And then?");
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let assistant = CannedAssistant::replying("unused");
    let mut session = ChatSession::new();

    assert!(session.send(&assistant, "   ", None).await.is_none());
    assert!(session.messages().is_empty());
    assert!(assistant.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failures_and_empty_replies_become_visible_messages() {
    let mut session = ChatSession::new();

    let reply = session
        .send(&CannedAssistant::failing(), "Hello?", None)
        .await
        .unwrap();
    assert_eq!(reply.text, FAILED_REPLY);

    let reply = session
        .send(&CannedAssistant::replying("  "), "Hello again", None)
        .await
        .unwrap();
    assert_eq!(reply.text, EMPTY_REPLY);
    assert_eq!(reply.role, Role::Model);
}
