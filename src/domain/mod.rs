//! Domain layer - Core retrieval-augmented generation logic and contracts

pub mod blob;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingestion;
pub mod llm;
pub mod prompt;
pub mod rag;
pub mod retrieval;
pub mod retry;

pub use blob::StorageProvider;
pub use document::{content_hash, Document, DocumentId, ExtractionMetadata, PageSpan};
pub use embedding::{cosine_similarity, EmbeddingProvider, EmbeddingVector};
pub use error::{DomainError, ProviderError, ProviderErrorKind, Stage};
pub use extractor::{guess_content_type, Extraction, Extractor};
pub use index::{
    CommittedVersion, DocumentVersion, IndexStore, IndexedPassage, PassageId, ScoredPassage,
    SearchFilter, SearchQuery,
};
pub use ingestion::{
    split, BoundaryMode, Chunk, ChunkingConfig, Chunks, DocumentReport, DocumentSource,
    DocumentStatus, IngestionReport,
};
pub use llm::{Completion, FinishReason, GenerationParams, GenerationProvider, Message, MessageRole, Usage};
pub use prompt::{estimate_tokens, ConversationTurn, IncludedPassage, Prompt, PromptAssembler};
pub use rag::{
    AnswerError, AnswerErrorCode, AnswerResponse, Citation, EmptyContextPolicy, Grounding,
    RagConfig, RagOrchestrator,
};
pub use retrieval::{
    HybridWeights, RetrievalResult, RetrievedPassage, Retriever, RetrieverConfig,
};
pub use retry::RetryPolicy;
