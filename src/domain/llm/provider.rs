use async_trait::async_trait;
use std::fmt::Debug;

use super::{Completion, GenerationParams, Message};
use crate::domain::error::ProviderError;

/// Trait for chat-completion providers (Azure OpenAI, etc.)
#[async_trait]
pub trait GenerationProvider: Send + Sync + Debug {
    /// Produce a completion for the given conversation
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
