//! services/api/src/adapters/assistant_llm.rs
//!
//! This module contains the adapter for the study assistant LLM.
//! It implements the `StudyAssistant` port from the core crate against any
//! OpenAI-compatible chat completions endpoint (Gemini by default).

const CHAT_INSTRUCTIONS: &str = "You are Lumina, a brilliant and friendly university study assistant. \
Your goal is to help students understand complex topics simply. Break down answers into logical steps, \
use bullet points, and always encourage the student. If asked to generate quizzes or flashcards, \
provide clear questions and answers.";

const SUMMARY_INSTRUCTIONS: &str =
    "Provide a student-friendly summary. Focus on clarity and core concepts.";

const PLAN_INSTRUCTIONS: &str =
    "Create a motivational and realistic study plan. Break topics into manageable daily chunks.";

const FLASHCARD_COUNT: usize = 5;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use lumina_core::{
    domain::{ChatMessage, Flashcard, Role},
    flashcards::parse_flashcards,
    ports::{PortError, PortResult, StudyAssistant},
};
use serde_json::json;
use tracing::{debug, instrument};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `StudyAssistant` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiAssistantAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiAssistantAdapter {
    /// Creates a new `OpenAiAssistantAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Builds a client for `api_base` authenticated with `api_key`.
    pub fn connect(api_base: &str, api_key: &str, model: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key(api_key);
        Self::new(Client::with_config(config), model)
    }

    /// Sends one completion request and returns the trimmed text of the first choice.
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        response_format: Option<ResponseFormat>,
    ) -> PortResult<String> {
        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages).n(1);
        if let Some(format) = response_format {
            request.response_format(format);
        }
        let request = request
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // A missing choice or empty content is an empty answer, not a failure.
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

fn system(text: &str) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(text)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn user(text: String) -> PortResult<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(text)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into())
}

fn from_history(message: &ChatMessage) -> PortResult<ChatCompletionRequestMessage> {
    match message.role {
        Role::User => user(message.text.clone()),
        Role::Model => Ok(ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.text.clone())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()),
    }
}

/// Structured-output schema for flashcards. The root of a JSON schema
/// response must be an object, so the list is wrapped in `cards`.
fn flashcard_format() -> ResponseFormat {
    ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            name: "flashcards".to_string(),
            description: Some("Question and answer study cards".to_string()),
            schema: Some(json!({
                "type": "object",
                "properties": {
                    "cards": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "question": { "type": "string" },
                                "answer": { "type": "string" }
                            },
                            "required": ["question", "answer"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["cards"],
                "additionalProperties": false
            })),
            strict: Some(true),
        },
    }
}

//=========================================================================================
// `StudyAssistant` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudyAssistant for OpenAiAssistantAdapter {
    #[instrument(skip_all, fields(history = history.len()))]
    async fn chat(&self, message: &str, history: &[ChatMessage]) -> PortResult<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system(CHAT_INSTRUCTIONS)?);
        for earlier in history {
            messages.push(from_history(earlier)?);
        }
        messages.push(user(message.to_string())?);

        self.complete(messages, None).await
    }

    #[instrument(skip_all)]
    async fn summarize_note(&self, content: &str) -> PortResult<String> {
        let messages = vec![
            system(SUMMARY_INSTRUCTIONS)?,
            user(format!(
                "Summarize the following study note into key takeaways and a short explanation: \n\n {content}"
            ))?,
        ];
        self.complete(messages, None).await
    }

    #[instrument(skip_all)]
    async fn generate_flashcards(&self, content: &str) -> PortResult<Vec<Flashcard>> {
        let messages = vec![user(format!(
            "Create a set of {FLASHCARD_COUNT} flashcards (question and answer) from this content: \n\n {content}"
        ))?];
        let raw = self.complete(messages, Some(flashcard_format())).await?;
        let cards = parse_flashcards(&raw);
        debug!(count = cards.len(), "parsed flashcards");
        Ok(cards)
    }

    #[instrument(skip_all, fields(%exam_date))]
    async fn create_study_plan(&self, exam_date: NaiveDate, topics: &[String]) -> PortResult<String> {
        let messages = vec![
            system(PLAN_INSTRUCTIONS)?,
            user(format!(
                "I have an exam on {exam_date}. The topics are: {}. Create a structured daily study plan to prepare efficiently.",
                topics.join(", ")
            ))?,
        ];
        self.complete(messages, None).await
    }
}
