use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::prompt::ConversationTurn;

pub const MAX_QUESTION_CHARS: u64 = 1000;

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 1000, message = "question must be 1 to 1000 characters"))]
    pub question: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

impl ChatRequest {
    /// First validation message, for the error reason
    pub fn validation_message(&self) -> Option<String> {
        let errors = self.validate().err()?;
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(question: &str) -> ChatRequest {
        ChatRequest {
            question: question.to_string(),
            history: Vec::new(),
        }
    }

    #[test]
    fn test_question_length_bounds() {
        assert!(request("What are the payment terms?").validate().is_ok());
        assert!(request("").validate().is_err());
        assert!(request(&"a".repeat(MAX_QUESTION_CHARS as usize)).validate().is_ok());
        assert!(request(&"a".repeat(MAX_QUESTION_CHARS as usize + 1)).validate().is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        assert!(request(&"é".repeat(MAX_QUESTION_CHARS as usize)).validate().is_ok());
    }

    #[test]
    fn test_validation_message() {
        assert_eq!(
            request("").validation_message().as_deref(),
            Some("question must be 1 to 1000 characters")
        );
        assert!(request("ok").validation_message().is_none());
    }

    #[test]
    fn test_history_defaults_to_empty() {
        let parsed: ChatRequest = serde_json::from_str(r#"{"question": "hi"}"#).unwrap();
        assert!(parsed.history.is_empty());
    }
}
