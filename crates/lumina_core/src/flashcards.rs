//! crates/lumina_core/src/flashcards.rs
//!
//! Lenient parsing of flashcards returned by the study assistant. Model output
//! is not trusted to be valid JSON; anything unreadable becomes an empty set.

use serde::Deserialize;
use tracing::warn;

use crate::domain::Flashcard;

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Bare(Vec<Flashcard>),
    Wrapped { cards: Vec<Flashcard> },
}

/// Parses a JSON array of `{question, answer}` objects, or an object holding
/// that array under `cards`. Never fails: malformed input yields no cards.
pub fn parse_flashcards(raw: &str) -> Vec<Flashcard> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Payload>(body) {
        Ok(Payload::Bare(cards)) | Ok(Payload::Wrapped { cards }) => cards,
        Err(err) => {
            warn!(error = %err, "failed to parse AI flashcards");
            Vec::new()
        }
    }
}

/// Models sometimes wrap JSON in a ```json fence despite being asked not to.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_wrapped_arrays() {
        let bare = r#"[{"question":"What is ATP?","answer":"Energy currency"}]"#;
        let cards = parse_flashcards(bare);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].question, "What is ATP?");

        let wrapped = r#"{"cards":[{"question":"Q1","answer":"A1"},{"question":"Q2","answer":"A2"}]}"#;
        assert_eq!(parse_flashcards(wrapped).len(), 2);
    }

    #[test]
    fn unwraps_fenced_json() {
        let fenced = "```json\n[{\"question\":\"Q\",\"answer\":\"A\"}]\n```";
        assert_eq!(parse_flashcards(fenced).len(), 1);
    }

    #[test]
    fn malformed_output_yields_no_cards() {
        assert!(parse_flashcards("").is_empty());
        assert!(parse_flashcards("Sure! Here are your flashcards:").is_empty());
        assert!(parse_flashcards(r#"[{"question":"missing answer"}]"#).is_empty());
        assert!(parse_flashcards(r#"[{"question":"Q","answer":"A"}"#).is_empty());
    }
}
