//! crates/lumina_core/src/chat.rs
//!
//! A conversation with the study assistant. The session owns the history and
//! turns failures into a visible reply instead of an error.

use tracing::error;

use crate::domain::{ChatMessage, Note};
use crate::ports::StudyAssistant;

pub const EMPTY_REPLY: &str = "I'm sorry, I couldn't process that.";
pub const FAILED_REPLY: &str = "An error occurred. Check your connection.";

#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sends `message` with the prior history, optionally grounded in a note.
    ///
    /// Returns the model's reply, or `None` when the message is blank.
    pub async fn send(
        &mut self,
        assistant: &dyn StudyAssistant,
        message: &str,
        context: Option<&Note>,
    ) -> Option<&ChatMessage> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }

        let prompt = match context {
            Some(note) => format!(
                "{message}\n\n[Context from current note: \"{}\"]: {}",
                note.title, note.content
            ),
            None => message.to_string(),
        };
        let history = self.messages.clone();
        self.messages.push(ChatMessage::user(message));

        let reply = match assistant.chat(&prompt, &history).await {
            Ok(text) if text.trim().is_empty() => EMPTY_REPLY.to_string(),
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "chat request failed");
                FAILED_REPLY.to_string()
            }
        };
        self.messages.push(ChatMessage::model(reply));
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
