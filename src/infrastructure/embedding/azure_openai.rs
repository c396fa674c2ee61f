//! Azure OpenAI embedding provider implementation

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::embedding::{EmbeddingProvider, EmbeddingVector};
use crate::domain::error::{ProviderError, Stage};
use crate::infrastructure::http_client::HttpClientTrait;
use crate::infrastructure::llm::AzureOpenAiConfig;

const PROVIDER: &str = "azure_openai";

/// Known embedding models and their dimensions
const EMBEDDING_MODELS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
];

pub fn known_dimensions(model: &str) -> Option<usize> {
    EMBEDDING_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dims)| *dims)
}

/// Azure OpenAI embedding provider
#[derive(Debug)]
pub struct AzureOpenAiEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    config: AzureOpenAiConfig,
    deployment: String,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
}

impl<C: HttpClientTrait> AzureOpenAiEmbeddingProvider<C> {
    /// `model` names the vectors' model; dimensions come from the known-model
    /// table unless set explicitly
    pub fn new(
        client: C,
        config: AzureOpenAiConfig,
        deployment: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let dimensions = known_dimensions(&model).unwrap_or(1536);

        Self {
            client,
            config,
            deployment: deployment.into(),
            model,
            dimensions,
            max_batch_size: 16,
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    fn embeddings_url(&self) -> String {
        self.config.deployment_url(&self.deployment, "embeddings")
    }

    fn parse_response(
        &self,
        json: serde_json::Value,
        expected: usize,
    ) -> Result<Vec<EmbeddingVector>, ProviderError> {
        let response: AzureEmbeddingResponse = serde_json::from_value(json).map_err(|e| {
            ProviderError::malformed(
                Stage::Embedding,
                PROVIDER,
                format!("Failed to parse embedding response: {}", e),
            )
        })?;

        if response.data.len() != expected {
            return Err(ProviderError::malformed(
                Stage::Embedding,
                PROVIDER,
                format!("Expected {} embeddings, got {}", expected, response.data.len()),
            ));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| EmbeddingVector::new(d.embedding))
            .collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for AzureOpenAiEmbeddingProvider<C> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.embeddings_url();
        let body = serde_json::json!({ "input": texts });

        let response = self
            .client
            .post_json(&url, self.config.headers(), &body)
            .await
            .map_err(|e| e.into_provider(Stage::Embedding, PROVIDER))?;

        self.parse_response(response, texts.len())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<AzureEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct AzureEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ProviderErrorKind;
    use crate::infrastructure::http_client::HttpClient;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_response(indices: &[usize], dimensions: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = indices
            .iter()
            .map(|&i| {
                let embedding: Vec<f32> = (0..dimensions).map(|j| (i * 10 + j) as f32).collect();
                serde_json::json!({"index": i, "embedding": embedding, "object": "embedding"})
            })
            .collect();

        serde_json::json!({
            "model": "text-embedding-3-small",
            "data": data,
            "usage": {"prompt_tokens": 10, "total_tokens": 10}
        })
    }

    fn provider(server: &MockServer) -> AzureOpenAiEmbeddingProvider<HttpClient> {
        AzureOpenAiEmbeddingProvider::new(
            HttpClient::new(),
            AzureOpenAiConfig::new(server.uri(), "key"),
            "embedding-deployment",
            "text-embedding-3-small",
        )
    }

    #[tokio::test]
    async fn test_embed_batch_in_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embedding-deployment/embeddings"))
            .and(header("api-key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[1, 0], 4)))
            .mount(&server)
            .await;

        let vectors = provider(&server)
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].as_slice()[0], 0.0);
        assert_eq!(vectors[1].as_slice()[0], 10.0);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(&[0], 4)))
            .mount(&server)
            .await;

        let err = provider(&server)
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_invalid_input_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("input too long"))
            .mount(&server)
            .await;

        let err = provider(&server).embed(&["a".to_string()]).await.unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::InvalidInput);
        assert_eq!(err.stage, Stage::Embedding);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_known_dimensions() {
        assert_eq!(known_dimensions("text-embedding-3-large"), Some(3072));
        assert_eq!(known_dimensions("custom"), None);
    }
}
