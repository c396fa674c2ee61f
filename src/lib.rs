//! PMP RAG Pipeline
//!
//! Retrieval-augmented question answering over private documents:
//! - Ingestion from blob storage through extraction, chunking and embedding
//! - Versioned, replace-on-reingest vector index population
//! - Hybrid retrieval, budgeted prompt assembly and citation validation
//! - Azure OpenAI, AI Search, Document Intelligence and Blob Storage backends

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use api::state::AppState;
use domain::{
    blob::StorageProvider, embedding::EmbeddingProvider, extractor::Extractor,
    index::IndexStore, llm::GenerationProvider, PromptAssembler, RagOrchestrator, Retriever,
};
use infrastructure::{
    blob::{AzureBlobConfig, AzureBlobStorage, InMemoryBlobStorage},
    embedding::{AzureOpenAiEmbeddingProvider, HashingEmbeddingProvider},
    extractor::{DocumentIntelligenceConfig, DocumentIntelligenceExtractor, RoutingExtractor},
    http_client::HttpClient,
    index::{AzureSearchConfig, AzureSearchIndexStore, InMemoryIndexStore},
    ingestion::IngestionPipeline,
    llm::{AzureOpenAiConfig, AzureOpenAiProvider, ExtractiveGenerationProvider},
    observability::init_metrics,
    services::IngestionService,
};

/// Which provider set the application is wired with
#[derive(Debug, Clone, Default)]
pub enum Backend {
    /// Azure OpenAI, AI Search, Document Intelligence and Blob Storage
    #[default]
    Azure,
    /// In-process index and blob store with offline embedding and generation,
    /// optionally seeded from a local directory
    InMemory { data_dir: Option<PathBuf> },
}

impl Backend {
    pub fn is_in_memory(&self) -> bool {
        matches!(self, Self::InMemory { .. })
    }
}

struct Providers {
    storage: Arc<dyn StorageProvider>,
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn IndexStore>,
    generator: Arc<dyn GenerationProvider>,
}

fn azure_providers(config: &AppConfig) -> Providers {
    let azure = &config.azure;
    let client = HttpClient::with_timeout(Duration::from_millis(
        config.retry.attempt_timeout_ms.max(1000),
    ));

    let openai = AzureOpenAiConfig::new(&azure.openai_endpoint, &azure.openai_api_key)
        .with_api_version(&azure.openai_api_version);

    let layout = DocumentIntelligenceExtractor::new(
        client.clone(),
        DocumentIntelligenceConfig::new(
            &azure.document_intelligence_endpoint,
            &azure.document_intelligence_key,
        ),
    );

    Providers {
        storage: Arc::new(AzureBlobStorage::new(
            client.clone(),
            AzureBlobConfig::new(&azure.storage_container_url, &azure.storage_sas_token),
        )),
        extractor: Arc::new(RoutingExtractor::new(Arc::new(layout))),
        embedder: Arc::new(AzureOpenAiEmbeddingProvider::new(
            client.clone(),
            openai.clone(),
            &azure.embedding_deployment,
            &config.rag.embedding_model,
        )),
        store: Arc::new(AzureSearchIndexStore::new(
            client.clone(),
            AzureSearchConfig::new(
                &azure.search_endpoint,
                &azure.search_api_key,
                &azure.search_index_name,
            ),
        )),
        generator: Arc::new(AzureOpenAiProvider::new(client, openai)),
    }
}

async fn in_memory_providers(data_dir: Option<&PathBuf>) -> anyhow::Result<Providers> {
    let storage = InMemoryBlobStorage::new();
    if let Some(dir) = data_dir {
        let loaded = storage
            .load_dir(dir)
            .await
            .with_context(|| format!("Failed to load documents from {}", dir.display()))?;
        info!(dir = %dir.display(), documents = loaded, "Seeded in-memory blob storage");
    }

    Ok(Providers {
        storage: Arc::new(storage),
        extractor: Arc::new(RoutingExtractor::local_only()),
        embedder: Arc::new(HashingEmbeddingProvider::default()),
        store: Arc::new(InMemoryIndexStore::new()),
        generator: Arc::new(ExtractiveGenerationProvider::new()),
    })
}

/// Create the application state with every component wired for `backend`.
/// `config` must already have passed [`AppConfig::validate`].
pub async fn create_app_state(config: &AppConfig, backend: &Backend) -> anyhow::Result<AppState> {
    let providers = match backend {
        Backend::Azure => azure_providers(config),
        Backend::InMemory { data_dir } => in_memory_providers(data_dir.as_ref()).await?,
    };

    let retry = config.retry_policy();

    let pipeline = IngestionPipeline::new(
        providers.storage,
        providers.extractor,
        providers.embedder.clone(),
        providers.store.clone(),
        config.ingestion_config(),
    );

    let mut retriever_config = config.retriever_config();
    // The index was built by this process's embedder
    retriever_config.embedding_model = providers.embedder.model().to_string();
    let retriever = Retriever::new(
        providers.embedder.clone(),
        providers.store.clone(),
        retriever_config,
        retry.clone(),
    );

    let assembler = PromptAssembler::new();
    let orchestrator = RagOrchestrator::new(
        retriever,
        assembler,
        providers.generator,
        config.rag_config(),
        retry,
    );

    info!(
        backend = if backend.is_in_memory() { "in_memory" } else { "azure" },
        embedding_model = providers.embedder.model(),
        index = providers.store.provider_name(),
        "Application state created"
    );

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        ingestion: Arc::new(IngestionService::new(Arc::new(pipeline))),
        store: providers.store,
        metrics: init_metrics(&config.metrics),
        config: Arc::new(config.clone()),
        in_memory: backend.is_in_memory(),
    })
}
