use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Stage};

/// How well the answer is supported by retrieved context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// The answer cites at least one supplied passage
    Grounded,
    /// Context was supplied but the answer cites none of it
    Unverified,
    /// No relevant context was found
    InsufficientContext,
}

/// Provenance of a passage the answer relies on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Marker as it appears in the answer, `[n]`
    pub marker: usize,
    pub passage_id: String,
    pub document_id: String,
    pub chunk_sequence: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub score: f32,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerErrorCode {
    InvalidArgument,
    Configuration,
    RetrievalUnavailable,
    GenerationUnavailable,
    Internal,
}

impl AnswerErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Configuration => "configuration",
            Self::RetrievalUnavailable => "retrieval_unavailable",
            Self::GenerationUnavailable => "generation_unavailable",
            Self::Internal => "internal",
        }
    }
}

/// Structured failure carried inside an [`AnswerResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerError {
    pub code: AnswerErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub reason: String,
}

impl AnswerError {
    pub fn new(code: AnswerErrorCode, stage: Option<Stage>, reason: impl Into<String>) -> Self {
        Self {
            code,
            stage,
            reason: reason.into(),
        }
    }

    pub fn generation_unavailable(reason: impl Into<String>) -> Self {
        Self::new(
            AnswerErrorCode::GenerationUnavailable,
            Some(Stage::Generation),
            reason,
        )
    }

    /// Classify an error raised before generation
    pub fn from_domain(error: &DomainError) -> Self {
        let code = match error {
            DomainError::InvalidArgument { .. } => AnswerErrorCode::InvalidArgument,
            DomainError::Configuration { .. }
            | DomainError::MissingConfiguration { .. }
            | DomainError::InvalidConfig { .. }
            | DomainError::DimensionMismatch { .. } => AnswerErrorCode::Configuration,
            DomainError::Provider(e) if e.stage == Stage::Generation => {
                AnswerErrorCode::GenerationUnavailable
            }
            DomainError::Provider(_) => AnswerErrorCode::RetrievalUnavailable,
            DomainError::NotFound { .. } | DomainError::Internal { .. } => {
                AnswerErrorCode::Internal
            }
        };

        let stage = match error {
            DomainError::InvalidArgument { .. } => Some(Stage::Request),
            other => other.stage(),
        };

        Self::new(code, stage, error.to_string())
    }
}

/// Final output of a query; never raised as an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub grounding: Grounding,
    /// Heuristic in `[0, 1]`
    pub confidence: f32,
    pub passages_retrieved: usize,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AnswerError>,
}

impl AnswerResponse {
    pub fn failure(answer: impl Into<String>, error: AnswerError) -> Self {
        Self {
            answer: answer.into(),
            citations: Vec::new(),
            grounding: Grounding::InsufficientContext,
            confidence: 0.0,
            passages_retrieved: 0,
            processing_time_ms: 0,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Label for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match (&self.error, self.grounding) {
            (Some(e), _) => e.code.as_str(),
            (None, Grounding::Grounded) => "grounded",
            (None, Grounding::Unverified) => "unverified",
            (None, Grounding::InsufficientContext) => "insufficient_context",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ProviderError;

    #[test]
    fn test_error_classification() {
        let err = AnswerError::from_domain(&DomainError::invalid_argument("k"));
        assert_eq!(err.code, AnswerErrorCode::InvalidArgument);
        assert_eq!(err.stage, Some(Stage::Request));

        let err = AnswerError::from_domain(&DomainError::from(ProviderError::unavailable(
            Stage::Search,
            "azure_search",
            "503",
        )));
        assert_eq!(err.code, AnswerErrorCode::RetrievalUnavailable);
        assert_eq!(err.stage, Some(Stage::Search));
    }

    #[test]
    fn test_failure_serialization() {
        let response =
            AnswerResponse::failure("unavailable", AnswerError::generation_unavailable("429"));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["error"]["code"], "generation_unavailable");
        assert_eq!(json["error"]["stage"], "generation");
        assert_eq!(json["grounding"], "insufficient_context");
        assert_eq!(response.outcome(), "generation_unavailable");
    }
}
