use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};
use crate::domain::llm::{
    Completion, FinishReason, GenerationParams, GenerationProvider, Message, MessageRole, Usage,
};
use crate::infrastructure::http_client::{HttpError, HttpClientTrait};

const PROVIDER: &str = "azure_openai";

/// Azure OpenAI resource configuration, shared by chat and embeddings
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
}

impl AzureOpenAiConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: "2024-02-01".to_string(),
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub(crate) fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.endpoint.trim_end_matches('/'),
            deployment,
            operation,
            self.api_version
        )
    }

    pub(crate) fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("api-key", self.api_key.as_str()),
            ("Content-Type", "application/json"),
        ]
    }
}

/// Azure OpenAI chat-completion provider
#[derive(Debug)]
pub struct AzureOpenAiProvider<C: HttpClientTrait> {
    client: C,
    config: AzureOpenAiConfig,
}

impl<C: HttpClientTrait> AzureOpenAiProvider<C> {
    pub fn new(client: C, config: AzureOpenAiConfig) -> Self {
        Self { client, config }
    }

    fn build_url(&self, deployment: &str) -> String {
        self.config.deployment_url(deployment, "chat/completions")
    }

    fn build_request(&self, messages: &[Message], params: &GenerationParams) -> serde_json::Value {
        let messages: Vec<AzureMessage> = messages.iter().map(AzureMessage::from_domain).collect();

        serde_json::json!({
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<Completion, ProviderError> {
        let response: AzureResponse = serde_json::from_value(json).map_err(|e| {
            ProviderError::malformed(
                Stage::Generation,
                PROVIDER,
                format!("Failed to parse response: {}", e),
            )
        })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::malformed(Stage::Generation, PROVIDER, "No choices in response")
        })?;

        let finish_reason = FinishReason::from_provider(choice.finish_reason.as_deref());
        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::new(
                Stage::Generation,
                PROVIDER,
                ProviderErrorKind::ContentFiltered,
                "Completion was stopped by the content filter",
            ));
        }

        let mut completion = Completion::new(
            choice.message.content.unwrap_or_default(),
            response.model,
        )
        .with_finish_reason(finish_reason);

        if let Some(usage) = response.usage {
            completion = completion.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        Ok(completion)
    }
}

/// Azure reports prompt rejections as 400 with a `content_filter` code
fn classify_error(error: HttpError) -> ProviderError {
    if error.status == Some(400) && error.message.contains("content_filter") {
        return ProviderError::new(
            Stage::Generation,
            PROVIDER,
            ProviderErrorKind::ContentFiltered,
            error.message,
        );
    }
    error.into_provider(Stage::Generation, PROVIDER)
}

#[async_trait]
impl<C: HttpClientTrait> GenerationProvider for AzureOpenAiProvider<C> {
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        let url = self.build_url(&params.model);
        let body = self.build_request(messages, params);

        debug!(deployment = %params.model, messages = messages.len(), "Calling chat completion");

        let response = self
            .client
            .post_json(&url, self.config.headers(), &body)
            .await
            .map_err(classify_error)?;

        self.parse_response(response)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// Azure OpenAI API types

#[derive(Debug, Serialize)]
struct AzureMessage {
    role: &'static str,
    content: String,
}

impl AzureMessage {
    fn from_domain(message: &Message) -> Self {
        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        Self {
            role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AzureResponse {
    model: String,
    choices: Vec<AzureChoice>,
    usage: Option<AzureUsage>,
}

#[derive(Debug, Deserialize)]
struct AzureChoice {
    message: AzureResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
