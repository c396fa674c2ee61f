use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DocumentVersion, IndexedPassage};
use crate::domain::document::DocumentId;
use crate::domain::embedding::EmbeddingVector;
use crate::domain::error::ProviderError;

/// Restricts a search to matching passages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Only passages of these documents (empty = any document)
    #[serde(default)]
    pub document_ids: Vec<DocumentId>,
    /// Exact-match metadata constraints
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(document_id: DocumentId) -> Self {
        Self {
            document_ids: vec![document_id],
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty() && self.metadata.is_empty()
    }

    pub fn matches(&self, passage: &IndexedPassage) -> bool {
        (self.document_ids.is_empty() || self.document_ids.contains(&passage.document_id))
            && self
                .metadata
                .iter()
                .all(|(k, v)| passage.metadata.get(k) == Some(v))
    }
}

/// Hybrid search request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub vector: EmbeddingVector,
    /// Keyword query text, scored by the store when present
    pub text: Option<String>,
    pub filter: SearchFilter,
    pub k: usize,
}

/// A search hit with the raw signals the store computed
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: IndexedPassage,
    /// Vector similarity in `[0, 1]`
    pub vector_score: f32,
    /// Store-native keyword relevance, unnormalised
    pub keyword_score: Option<f32>,
}

/// Summary of the passages committed for one document version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedVersion {
    pub version: DocumentVersion,
    pub content_hash: String,
    pub embedding_model: String,
    pub passage_count: usize,
    /// Chunks the version was split into; more than `passage_count` when
    /// some chunks failed to embed
    pub chunk_count: usize,
    /// Passages of the same document still tagged with older versions
    pub superseded_passages: usize,
}

impl CommittedVersion {
    /// Every chunk of the version made it into the index
    pub fn is_complete(&self) -> bool {
        self.passage_count >= self.chunk_count
    }
}

/// Persists passages and answers hybrid searches
#[async_trait]
pub trait IndexStore: Send + Sync + Debug {
    /// Insert or replace passages by id; returns how many were written
    async fn upsert(&self, passages: Vec<IndexedPassage>) -> Result<usize, ProviderError>;

    /// Top `k` passages by vector similarity, restricted by the filter
    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredPassage>, ProviderError>;

    /// Remove every passage of a document; returns how many were removed
    async fn delete(&self, document_id: &DocumentId) -> Result<usize, ProviderError>;

    /// Remove passages of a document whose version differs from `keep`
    async fn delete_other_versions(
        &self,
        document_id: &DocumentId,
        keep: &DocumentVersion,
    ) -> Result<usize, ProviderError>;

    /// Remove the passages of one version of a document
    async fn delete_version(
        &self,
        document_id: &DocumentId,
        version: &DocumentVersion,
    ) -> Result<usize, ProviderError>;

    /// Newest committed version of a document, if any
    async fn committed_version(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<CommittedVersion>, ProviderError>;

    /// Number of passages matching the filter
    async fn count(&self, filter: &SearchFilter) -> Result<usize, ProviderError>;

    /// Check if the index is reachable
    async fn health_check(&self) -> Result<bool, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
