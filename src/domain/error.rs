use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stage at which an external provider was called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extraction,
    Chunking,
    Embedding,
    Indexing,
    Search,
    Generation,
    Request,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Extraction => "extraction",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Search => "search",
            Self::Generation => "generation",
            Self::Request => "request",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Provider throttled the request (HTTP 429)
    RateLimited,
    /// Call did not complete within its deadline
    Timeout,
    /// Transient 5xx or connection failure
    Unavailable,
    /// Request rejected as malformed or too large
    InvalidInput,
    /// Extractor cannot read this file type
    UnsupportedFormat,
    /// Generation refused by the content filter
    ContentFiltered,
    /// Requested key or resource does not exist
    NotFound,
    /// Credentials rejected
    Authentication,
    /// Provider answered with something we could not parse
    Malformed,
}

impl ProviderErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Unavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::InvalidInput => "invalid_input",
            Self::UnsupportedFormat => "unsupported_format",
            Self::ContentFiltered => "content_filtered",
            Self::NotFound => "not_found",
            Self::Authentication => "authentication",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an external collaborator, tagged with the stage that called it
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{stage} provider '{provider}' failed ({kind}): {message}")]
pub struct ProviderError {
    pub stage: Stage,
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        stage: Stage,
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(stage: Stage, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, provider, ProviderErrorKind::RateLimited, message)
    }

    pub fn timeout(stage: Stage, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, provider, ProviderErrorKind::Timeout, message)
    }

    pub fn unavailable(stage: Stage, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, provider, ProviderErrorKind::Unavailable, message)
    }

    pub fn invalid_input(stage: Stage, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, provider, ProviderErrorKind::InvalidInput, message)
    }

    pub fn malformed(stage: Stage, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, provider, ProviderErrorKind::Malformed, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Re-tag an error produced by a shared client with the stage that used it
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Missing required configuration: {}", .keys.join(", "))]
    MissingConfiguration { keys: Vec<String> },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn missing_configuration(keys: Vec<String>) -> Self {
        Self::MissingConfiguration { keys }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the failed call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Stage tag for provider failures
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Provider(e) => Some(e.stage),
            Self::DimensionMismatch { .. } => Some(Stage::Embedding),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_lists_every_key() {
        let error = DomainError::missing_configuration(vec![
            "AZURE_OPENAI_ENDPOINT".to_string(),
            "AZURE_SEARCH_API_KEY".to_string(),
        ]);
        assert_eq!(
            error.to_string(),
            "Missing required configuration: AZURE_OPENAI_ENDPOINT, AZURE_SEARCH_API_KEY"
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderErrorKind::RateLimited.is_retryable());
        assert!(ProviderErrorKind::Timeout.is_retryable());
        assert!(ProviderErrorKind::Unavailable.is_retryable());
        assert!(!ProviderErrorKind::InvalidInput.is_retryable());
        assert!(!ProviderErrorKind::ContentFiltered.is_retryable());
        assert!(!ProviderErrorKind::UnsupportedFormat.is_retryable());
    }

    #[test]
    fn test_provider_error_display_carries_stage() {
        let error = ProviderError::rate_limited(Stage::Generation, "azure_openai", "429");
        assert_eq!(
            error.to_string(),
            "generation provider 'azure_openai' failed (rate_limited): 429"
        );
        assert_eq!(DomainError::from(error).stage(), Some(Stage::Generation));
    }

    #[test]
    fn test_at_stage_retags() {
        let error = ProviderError::timeout(Stage::Fetch, "http", "deadline").at_stage(Stage::Search);
        assert_eq!(error.stage, Stage::Search);
    }
}
