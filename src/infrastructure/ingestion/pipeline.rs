//! Ingestion pipeline: storage -> extractor -> chunker -> embeddings -> index

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::blob::StorageProvider;
use crate::domain::document::{Document, DocumentId};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::error::{DomainError, ProviderError, Stage};
use crate::domain::extractor::{guess_content_type, Extractor};
use crate::domain::index::{CommittedVersion, DocumentVersion, IndexStore, IndexedPassage, PassageId};
use crate::domain::ingestion::{
    split, Chunk, ChunkingConfig, DocumentReport, DocumentSource, DocumentStatus, IngestionReport,
};
use crate::domain::retry::RetryPolicy;
use crate::infrastructure::observability::{record_document_ingested, record_provider_call};

/// Ingestion pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Upper bound on texts per embedding call; the provider's own limit
    /// applies when lower
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    /// Documents processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Skip documents whose content hash matches a complete committed version
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
}

fn default_embedding_batch_size() -> usize {
    16
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            retry: RetryPolicy::default(),
            embedding_batch_size: default_embedding_batch_size(),
            concurrency: default_concurrency(),
            skip_unchanged: true,
        }
    }
}

/// Per-document failure, carried to the report
struct Failure {
    stage: Stage,
    reason: String,
}

impl Failure {
    fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl From<ProviderError> for Failure {
    fn from(e: ProviderError) -> Self {
        Self::new(e.stage, e.to_string())
    }
}

/// Ingests documents from storage into the index.
///
/// Documents are independent: each runs its own fetch, extract, chunk,
/// embed and commit sequence, and a failure is recorded on that document's
/// report only. Re-ingestions of the same document are serialized.
#[derive(Clone)]
pub struct IngestionPipeline {
    storage: Arc<dyn StorageProvider>,
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn IndexStore>,
    config: IngestionConfig,
    document_locks: Arc<RwLock<HashMap<DocumentId, Arc<Mutex<()>>>>>,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("storage", &self.storage.provider_name())
            .field("extractor", &self.extractor)
            .field("embedder", &self.embedder)
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn IndexStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            storage,
            extractor,
            embedder,
            store,
            config,
            document_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest every document the source names
    #[instrument(skip(self), fields(source = ?source))]
    pub async fn ingest(&self, source: DocumentSource) -> IngestionReport {
        let mut report = IngestionReport::new();

        let keys = match self.resolve(&source).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Failed to list documents");
                let id = match &source {
                    DocumentSource::Prefix(prefix) => prefix.clone(),
                    DocumentSource::Keys(_) => String::new(),
                };
                report.add(DocumentReport::new(
                    id,
                    DocumentStatus::failed(e.stage, e.to_string()),
                ));
                return report;
            }
        };

        info!(documents = keys.len(), "Starting ingestion");

        let reports: Vec<DocumentReport> = stream::iter(keys)
            .map(|key| async move { self.ingest_document(&key).await })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for document in reports {
            report.add(document);
        }
        let report = report.sorted();

        info!(
            total = report.total_documents(),
            succeeded = report.succeeded(),
            partially_failed = report.partially_failed(),
            failed = report.failed(),
            unchanged = report.unchanged(),
            passages = report.total_passages_indexed(),
            "Ingestion finished"
        );

        report
    }

    /// Remove every passage of a document
    pub async fn delete_document(&self, document_id: &DocumentId) -> Result<usize, DomainError> {
        let lock = self.document_lock(document_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.config
                .retry
                .run(Stage::Indexing, self.store.provider_name(), || {
                    self.store.delete(document_id)
                })
                .await
        };
        self.release_lock(document_id, lock).await;

        let removed = result?;
        info!(document = %document_id, removed, "Document deleted from index");
        Ok(removed)
    }

    async fn resolve(&self, source: &DocumentSource) -> Result<Vec<String>, ProviderError> {
        match source {
            DocumentSource::Prefix(prefix) => {
                self.config
                    .retry
                    .run(Stage::Fetch, self.storage.provider_name(), || {
                        self.storage.list(prefix)
                    })
                    .await
            }
            DocumentSource::Keys(keys) => {
                let mut unique = Vec::with_capacity(keys.len());
                for key in keys {
                    if !unique.contains(key) {
                        unique.push(key.clone());
                    }
                }
                Ok(unique)
            }
        }
    }

    /// Get or create the lock serializing work on one document
    async fn document_lock(&self, document_id: &DocumentId) -> Arc<Mutex<()>> {
        {
            let locks = self.document_locks.read().await;

            if let Some(lock) = locks.get(document_id) {
                return lock.clone();
            }
        }

        let mut locks = self.document_locks.write().await;
        locks
            .entry(document_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the caller's handle and forget the lock once nobody else holds it
    async fn release_lock(&self, document_id: &DocumentId, lock: Arc<Mutex<()>>) {
        let mut locks = self.document_locks.write().await;
        drop(lock);

        // Handles are only cloned under the map lock, so the count is stable here
        if locks
            .get(document_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(document_id);
        }
    }

    #[instrument(skip(self), fields(document = %key))]
    async fn ingest_document(&self, key: &str) -> DocumentReport {
        let started = Instant::now();

        let report = match DocumentId::new(key) {
            Ok(document_id) => {
                let lock = self.document_lock(&document_id).await;
                let result = {
                    let _guard = lock.lock().await;
                    self.process(&document_id, key).await
                };
                self.release_lock(&document_id, lock).await;

                match result {
                    Ok(report) => report,
                    Err(failure) => {
                        error!(
                            stage = %failure.stage,
                            reason = %failure.reason,
                            "Document ingestion failed"
                        );
                        DocumentReport::new(key, DocumentStatus::failed(failure.stage, failure.reason))
                    }
                }
            }
            Err(e) => DocumentReport::new(key, DocumentStatus::failed(Stage::Fetch, e.to_string())),
        };

        record_document_ingested(
            report.status.as_str(),
            report.passages_indexed,
            started.elapsed(),
        );
        report
    }

    async fn process(&self, document_id: &DocumentId, key: &str) -> Result<DocumentReport, Failure> {
        let retry = &self.config.retry;

        let bytes = self
            .timed(Stage::Fetch, self.storage.provider_name(), || {
                retry.run(Stage::Fetch, self.storage.provider_name(), || {
                    self.storage.fetch(key)
                })
            })
            .await?;

        let content_hash = crate::domain::document::content_hash(&bytes);
        if self.config.skip_unchanged {
            if let Some(committed) = self.reusable_version(document_id, &content_hash).await {
                let replaced = if committed.superseded_passages > 0 {
                    info!(
                        superseded = committed.superseded_passages,
                        "Content unchanged, removing superseded passages"
                    );
                    self.swap(document_id, &committed.version).await
                } else {
                    info!("Content unchanged since last ingestion, skipping");
                    0
                };
                return Ok(DocumentReport::new(key, DocumentStatus::Unchanged).with_passages(0, replaced));
            }
        }

        let content_type = guess_content_type(key);
        let extraction = self
            .timed(Stage::Extraction, self.extractor.provider_name(), || {
                retry.run(Stage::Extraction, self.extractor.provider_name(), || {
                    self.extractor.extract(&bytes, &content_type)
                })
            })
            .await?;

        let document = Document::new(
            document_id.clone(),
            bytes,
            extraction.text,
            extraction.metadata,
        );

        let chunks: Vec<Chunk<'_>> = split(document.text(), &self.config.chunking)
            .map_err(|e| Failure::new(Stage::Chunking, e.to_string()))?
            .collect();

        debug!(chunks = chunks.len(), content_type = %content_type, "Document chunked");

        if chunks.is_empty() {
            let replaced = self.clear(document_id).await?;
            info!(replaced, "Document has no text");
            return Ok(DocumentReport::new(key, DocumentStatus::Succeeded).with_passages(0, replaced));
        }

        let version = DocumentVersion::generate();
        let (passages, failed_chunks) = self
            .embed_chunks(&document, &chunks, &version, &content_type)
            .await?;

        if passages.is_empty() {
            return Err(Failure::new(
                Stage::Embedding,
                format!("all {} chunks failed to embed", failed_chunks),
            ));
        }

        let indexed = self.commit(document_id, &version, passages).await?;
        let replaced = self.swap(document_id, &version).await;

        let status = if failed_chunks > 0 {
            warn!(failed_chunks, indexed, "Document partially ingested");
            DocumentStatus::PartiallyFailed {
                failed_chunk_count: failed_chunks,
            }
        } else {
            info!(indexed, replaced, version = %version, "Document ingested");
            DocumentStatus::Succeeded
        };

        Ok(DocumentReport::new(key, status).with_passages(indexed, replaced))
    }

    /// The committed version, when it already holds every chunk of this
    /// content under the current embedding model
    async fn reusable_version(
        &self,
        document_id: &DocumentId,
        content_hash: &str,
    ) -> Option<CommittedVersion> {
        let committed = self
            .config
            .retry
            .run(Stage::Indexing, self.store.provider_name(), || {
                self.store.committed_version(document_id)
            })
            .await;

        match committed {
            Ok(Some(committed))
                if committed.content_hash == content_hash
                    && committed.embedding_model == self.embedder.model() =>
            {
                if committed.is_complete() {
                    Some(committed)
                } else {
                    info!(
                        indexed = committed.passage_count,
                        chunks = committed.chunk_count,
                        "Committed version is missing chunks, re-ingesting"
                    );
                    None
                }
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Could not read committed version, re-ingesting");
                None
            }
        }
    }

    /// Embed chunks batch by batch.
    ///
    /// A batch that fails permanently, or exhausts its retries, marks its
    /// chunks failed and the remaining batches continue. Vectors of the
    /// wrong size fail the whole document.
    async fn embed_chunks(
        &self,
        document: &Document,
        chunks: &[Chunk<'_>],
        version: &DocumentVersion,
        content_type: &str,
    ) -> Result<(Vec<IndexedPassage>, usize), Failure> {
        let batch_size = self
            .config
            .embedding_batch_size
            .min(self.embedder.max_batch_size())
            .max(1);
        let expected_dimensions = self.embedder.dimensions();

        let mut passages = Vec::with_capacity(chunks.len());
        let mut failed = 0;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.to_string()).collect();

            let vectors = match self
                .timed(Stage::Embedding, self.embedder.provider_name(), || {
                    self.config
                        .retry
                        .run(Stage::Embedding, self.embedder.provider_name(), || {
                            self.embedder.embed(&texts)
                        })
                })
                .await
            {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    warn!(
                        expected = batch.len(),
                        actual = vectors.len(),
                        "Embedding batch returned the wrong number of vectors"
                    );
                    failed += batch.len();
                    continue;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        first_chunk = batch[0].sequence,
                        chunks = batch.len(),
                        "Embedding batch failed, marking chunks failed"
                    );
                    failed += batch.len();
                    continue;
                }
            };

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.dimensions() != expected_dimensions {
                    let mismatch = DomainError::DimensionMismatch {
                        expected: expected_dimensions,
                        actual: vector.dimensions(),
                    };
                    return Err(Failure::new(Stage::Embedding, mismatch.to_string()));
                }

                debug!(sequence = chunk.sequence, "Chunk embedded");
                passages.push(self.passage(document, chunk, chunks.len(), version, vector, content_type));
            }
        }

        Ok((passages, failed))
    }

    fn passage(
        &self,
        document: &Document,
        chunk: &Chunk<'_>,
        chunk_count: usize,
        version: &DocumentVersion,
        vector: crate::domain::embedding::EmbeddingVector,
        content_type: &str,
    ) -> IndexedPassage {
        IndexedPassage {
            id: PassageId::new(document.id(), version, chunk.sequence),
            document_id: document.id().clone(),
            version: version.clone(),
            sequence: chunk.sequence,
            text: chunk.text.to_string(),
            start: chunk.start,
            end: chunk.end,
            page: document.metadata().page_at(chunk.start),
            vector,
            embedding_model: self.embedder.model().to_string(),
            content_hash: document.content_hash().to_string(),
            chunk_count,
            metadata: Default::default(),
        }
        .with_metadata("content_type", content_type)
    }

    /// Upsert the new version; on failure remove whatever part of it landed
    async fn commit(
        &self,
        document_id: &DocumentId,
        version: &DocumentVersion,
        passages: Vec<IndexedPassage>,
    ) -> Result<usize, Failure> {
        let retry = &self.config.retry;
        let provider = self.store.provider_name();

        let result = self
            .timed(Stage::Indexing, provider, || {
                retry.run(Stage::Indexing, provider, || {
                    self.store.upsert(passages.clone())
                })
            })
            .await;

        match result {
            Ok(indexed) => Ok(indexed),
            Err(e) => {
                if let Err(cleanup) = retry
                    .run(Stage::Indexing, provider, || {
                        self.store.delete_version(document_id, version)
                    })
                    .await
                {
                    error!(error = %cleanup, version = %version, "Failed to remove partial version");
                }
                Err(e.into())
            }
        }
    }

    /// Remove earlier versions once the new one is committed
    async fn swap(&self, document_id: &DocumentId, keep: &DocumentVersion) -> usize {
        match self
            .config
            .retry
            .run(Stage::Indexing, self.store.provider_name(), || {
                self.store.delete_other_versions(document_id, keep)
            })
            .await
        {
            Ok(replaced) => replaced,
            Err(e) => {
                // The next run of this document retries the removal
                warn!(error = %e, "Failed to remove superseded passages");
                0
            }
        }
    }

    async fn clear(&self, document_id: &DocumentId) -> Result<usize, Failure> {
        Ok(self
            .config
            .retry
            .run(Stage::Indexing, self.store.provider_name(), || {
                self.store.delete(document_id)
            })
            .await?)
    }

    async fn timed<T, F, Fut>(&self, stage: Stage, provider: &str, op: F) -> Result<T, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let result = op().await;
        record_provider_call(stage, provider, result.is_ok(), started.elapsed());
        result
    }
}
