use serde::Deserialize;

use crate::domain::error::DomainError;
use crate::domain::ingestion::{BoundaryMode, ChunkingConfig};
use crate::domain::llm::GenerationParams;
use crate::domain::rag::{EmptyContextPolicy, RagConfig};
use crate::domain::retrieval::{HybridWeights, RetrieverConfig};
use crate::domain::retry::RetryPolicy;
use crate::infrastructure::ingestion::IngestionConfig;
use crate::infrastructure::observability::MetricsConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub rag: RagSettings,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Endpoints and credentials of the Azure services
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AzureConfig {
    pub openai_endpoint: String,
    pub openai_api_key: String,
    pub openai_api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub search_endpoint: String,
    pub search_api_key: String,
    pub search_index_name: String,
    pub document_intelligence_endpoint: String,
    pub document_intelligence_key: String,
    pub storage_container_url: String,
    pub storage_sas_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub embedding_model: String,
    /// Overrides the chat deployment when set
    pub generation_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub vector_weight: f32,
    pub keyword_weight: f32,
    pub max_context_tokens: usize,
    pub empty_context_policy: EmptyContextPolicy,
    pub retry_content_filtered: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub boundary_mode: BoundaryMode,
    pub embedding_batch_size: usize,
    pub concurrency: usize,
    pub skip_unchanged: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            generation_model: String::new(),
            max_tokens: 1000,
            temperature: 0.3,
            top_k: 5,
            similarity_threshold: 0.3,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            max_context_tokens: 3000,
            empty_context_policy: EmptyContextPolicy::default(),
            retry_content_filtered: true,
        }
    }
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            boundary_mode: BoundaryMode::default(),
            embedding_batch_size: 16,
            concurrency: 4,
            skip_unchanged: true,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            max_delay_ms: 10_000,
            attempt_timeout_ms: 30_000,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, config::ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| config::ConfigError::Message(format!("{}: {}", key, e)))
}

impl AppConfig {
    /// Load from `config/default.*`, `config/local.*`, `APP__`-prefixed
    /// variables and finally the flat function-host variables
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: Self = config.try_deserialize()?;
        app.apply_env(|key| std::env::var(key).ok())?;
        Ok(app)
    }

    /// Overlay the flat variables (`AZURE_OPENAI_ENDPOINT`, `TOP_K_DOCUMENTS`, ...)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let azure = &mut self.azure;
        let strings: [(&str, &mut String); 12] = [
            ("AZURE_OPENAI_ENDPOINT", &mut azure.openai_endpoint),
            ("AZURE_OPENAI_API_KEY", &mut azure.openai_api_key),
            ("OPENAI_API_VERSION", &mut azure.openai_api_version),
            ("AZURE_OPENAI_DEPLOYMENT_NAME", &mut azure.chat_deployment),
            ("AZURE_OPENAI_EMBEDDING_DEPLOYMENT", &mut azure.embedding_deployment),
            ("AZURE_SEARCH_ENDPOINT", &mut azure.search_endpoint),
            ("AZURE_SEARCH_API_KEY", &mut azure.search_api_key),
            ("AZURE_SEARCH_INDEX_NAME", &mut azure.search_index_name),
            ("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT", &mut azure.document_intelligence_endpoint),
            ("AZURE_DOCUMENT_INTELLIGENCE_KEY", &mut azure.document_intelligence_key),
            ("AZURE_STORAGE_CONTAINER_URL", &mut azure.storage_container_url),
            ("AZURE_STORAGE_SAS_TOKEN", &mut azure.storage_sas_token),
        ];
        for (key, field) in strings {
            if let Some(value) = get(key) {
                *field = value;
            }
        }

        if let Some(v) = get("EMBEDDING_MODEL") {
            self.rag.embedding_model = v;
        }
        if let Some(v) = get("GENERATION_MODEL") {
            self.rag.generation_model = v;
        }
        if let Some(v) = get("MAX_TOKENS") {
            self.rag.max_tokens = parse("MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("TEMPERATURE") {
            self.rag.temperature = parse("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("TOP_K_DOCUMENTS") {
            self.rag.top_k = parse("TOP_K_DOCUMENTS", &v)?;
        }
        if let Some(v) = get("SIMILARITY_THRESHOLD") {
            self.rag.similarity_threshold = parse("SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MAX_CONTEXT_TOKENS") {
            self.rag.max_context_tokens = parse("MAX_CONTEXT_TOKENS", &v)?;
        }
        if let Some(v) = get("EMPTY_CONTEXT_POLICY") {
            self.rag.empty_context_policy = parse("EMPTY_CONTEXT_POLICY", &v)?;
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.ingestion.chunk_size = parse("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.ingestion.chunk_overlap = parse("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse("RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("RETRY_BACKOFF_BASE_MS") {
            self.retry.backoff_base_ms = parse("RETRY_BACKOFF_BASE_MS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v.to_lowercase();
        }

        if self.azure.openai_api_version.is_empty() {
            self.azure.openai_api_version = "2024-02-01".to_string();
        }

        Ok(())
    }

    /// Startup validation. With `in_memory` the Azure settings are not required.
    pub fn validate(&self, in_memory: bool) -> Result<(), DomainError> {
        if !in_memory {
            let missing = self.missing_keys();
            if !missing.is_empty() {
                return Err(DomainError::missing_configuration(missing));
            }
        }

        self.chunking_config().validate()?;

        if self.rag.top_k == 0 {
            return Err(DomainError::invalid_config("TOP_K_DOCUMENTS must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.rag.similarity_threshold) {
            return Err(DomainError::invalid_config(
                "SIMILARITY_THRESHOLD must be between 0 and 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.rag.temperature) {
            return Err(DomainError::invalid_config("TEMPERATURE must be between 0 and 2"));
        }
        if self.rag.max_tokens == 0 {
            return Err(DomainError::invalid_config("MAX_TOKENS must be greater than 0"));
        }
        if self.rag.max_context_tokens == 0 {
            return Err(DomainError::invalid_config(
                "MAX_CONTEXT_TOKENS must be greater than 0",
            ));
        }
        self.weights().validate()?;
        if self.retry.max_attempts == 0 {
            return Err(DomainError::invalid_config("RETRY_MAX_ATTEMPTS must be at least 1"));
        }
        if self.ingestion.embedding_batch_size == 0 || self.ingestion.concurrency == 0 {
            return Err(DomainError::invalid_config(
                "embedding batch size and ingestion concurrency must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Every required Azure setting left empty, by its variable name
    pub fn missing_keys(&self) -> Vec<String> {
        let azure = &self.azure;
        [
            ("AZURE_OPENAI_ENDPOINT", &azure.openai_endpoint),
            ("AZURE_OPENAI_API_KEY", &azure.openai_api_key),
            ("AZURE_OPENAI_DEPLOYMENT_NAME", &azure.chat_deployment),
            ("AZURE_OPENAI_EMBEDDING_DEPLOYMENT", &azure.embedding_deployment),
            ("AZURE_SEARCH_ENDPOINT", &azure.search_endpoint),
            ("AZURE_SEARCH_API_KEY", &azure.search_api_key),
            ("AZURE_SEARCH_INDEX_NAME", &azure.search_index_name),
            ("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT", &azure.document_intelligence_endpoint),
            ("AZURE_DOCUMENT_INTELLIGENCE_KEY", &azure.document_intelligence_key),
            ("AZURE_STORAGE_CONTAINER_URL", &azure.storage_container_url),
            ("AZURE_STORAGE_SAS_TOKEN", &azure.storage_sas_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key.to_string())
        .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts)
            .with_base_delay(self.retry.backoff_base_ms)
            .with_max_delay(self.retry.max_delay_ms)
            .with_attempt_timeout(self.retry.attempt_timeout_ms)
    }

    pub fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig::new(self.ingestion.chunk_size, self.ingestion.chunk_overlap)
            .with_boundary_mode(self.ingestion.boundary_mode)
    }

    pub fn ingestion_config(&self) -> IngestionConfig {
        IngestionConfig {
            chunking: self.chunking_config(),
            retry: self.retry_policy(),
            embedding_batch_size: self.ingestion.embedding_batch_size,
            concurrency: self.ingestion.concurrency,
            skip_unchanged: self.ingestion.skip_unchanged,
        }
    }

    fn weights(&self) -> HybridWeights {
        HybridWeights::new(self.rag.vector_weight, self.rag.keyword_weight)
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            embedding_model: self.rag.embedding_model.clone(),
            top_k: self.rag.top_k,
            min_relevance: self.rag.similarity_threshold,
            weights: self.weights(),
            ..Default::default()
        }
    }

    pub fn generation_params(&self) -> GenerationParams {
        let model = if self.rag.generation_model.is_empty() {
            self.azure.chat_deployment.clone()
        } else {
            self.rag.generation_model.clone()
        };

        GenerationParams::new(model)
            .with_max_tokens(self.rag.max_tokens)
            .with_temperature(self.rag.temperature)
    }

    pub fn rag_config(&self) -> RagConfig {
        RagConfig {
            top_k: self.rag.top_k,
            max_context_tokens: self.rag.max_context_tokens,
            empty_context_policy: self.rag.empty_context_policy,
            generation: self.generation_params(),
            retry_content_filtered: self.rag.retry_content_filtered,
        }
    }
}
