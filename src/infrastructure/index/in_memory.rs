//! In-memory index store for development and testing

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::document::DocumentId;
use crate::domain::embedding::cosine_similarity;
use crate::domain::error::ProviderError;
use crate::domain::index::{
    CommittedVersion, DocumentVersion, IndexStore, IndexedPassage, PassageId, ScoredPassage,
    SearchFilter, SearchQuery,
};

/// In-memory index store, brute-force cosine search
#[derive(Debug, Default, Clone)]
pub struct InMemoryIndexStore {
    passages: Arc<RwLock<BTreeMap<PassageId, IndexedPassage>>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored passage, ordered by id
    pub async fn all(&self) -> Vec<IndexedPassage> {
        self.passages.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn upsert(&self, passages: Vec<IndexedPassage>) -> Result<usize, ProviderError> {
        let mut store = self.passages.write().await;
        let count = passages.len();

        for passage in passages {
            store.insert(passage.id.clone(), passage);
        }

        Ok(count)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredPassage>, ProviderError> {
        let store = self.passages.read().await;

        let mut hits: Vec<ScoredPassage> = store
            .values()
            .filter(|p| query.filter.matches(p))
            .map(|p| ScoredPassage {
                vector_score: cosine_similarity(query.vector.as_slice(), p.vector.as_slice())
                    .max(0.0),
                keyword_score: None,
                passage: p.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.vector_score
                .total_cmp(&a.vector_score)
                .then_with(|| a.passage.document_id.cmp(&b.passage.document_id))
                .then_with(|| a.passage.sequence.cmp(&b.passage.sequence))
        });
        hits.truncate(query.k);

        Ok(hits)
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<usize, ProviderError> {
        let mut store = self.passages.write().await;
        let before = store.len();
        store.retain(|_, p| &p.document_id != document_id);
        Ok(before - store.len())
    }

    async fn delete_other_versions(
        &self,
        document_id: &DocumentId,
        keep: &DocumentVersion,
    ) -> Result<usize, ProviderError> {
        let mut store = self.passages.write().await;
        let before = store.len();
        store.retain(|_, p| &p.document_id != document_id || &p.version == keep);
        Ok(before - store.len())
    }

    async fn delete_version(
        &self,
        document_id: &DocumentId,
        version: &DocumentVersion,
    ) -> Result<usize, ProviderError> {
        let mut store = self.passages.write().await;
        let before = store.len();
        store.retain(|_, p| &p.document_id != document_id || &p.version != version);
        Ok(before - store.len())
    }

    async fn committed_version(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<CommittedVersion>, ProviderError> {
        let store = self.passages.read().await;
        let passages: Vec<&IndexedPassage> = store
            .values()
            .filter(|p| &p.document_id == document_id)
            .collect();

        let Some(newest) = passages.iter().map(|p| &p.version).max() else {
            return Ok(None);
        };

        let current: Vec<_> = passages.iter().filter(|p| &p.version == newest).collect();

        Ok(current.first().map(|p| CommittedVersion {
            version: newest.clone(),
            content_hash: p.content_hash.clone(),
            embedding_model: p.embedding_model.clone(),
            passage_count: current.len(),
            chunk_count: p.chunk_count,
            superseded_passages: passages.len() - current.len(),
        }))
    }

    async fn count(&self, filter: &SearchFilter) -> Result<usize, ProviderError> {
        let store = self.passages.read().await;
        Ok(store.values().filter(|p| filter.matches(p)).count())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::EmbeddingVector;

    fn passage(doc: &str, version: &str, sequence: usize, vector: Vec<f32>) -> IndexedPassage {
        let document_id = DocumentId::new(doc).unwrap();
        let version = DocumentVersion::from_string(version);
        IndexedPassage {
            id: PassageId::new(&document_id, &version, sequence),
            document_id,
            version,
            sequence,
            text: format!("{} #{}", doc, sequence),
            start: 0,
            end: 1,
            page: None,
            vector: EmbeddingVector::new(vector),
            embedding_model: "m".to_string(),
            content_hash: "h".to_string(),
            chunk_count: 1,
            metadata: BTreeMap::new(),
        }
    }

    fn query(vector: Vec<f32>, k: usize) -> SearchQuery {
        SearchQuery {
            vector: EmbeddingVector::new(vector),
            text: None,
            filter: SearchFilter::new(),
            k,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryIndexStore::new();
        store
            .upsert(vec![
                passage("a", "v1", 0, vec![1.0, 0.0]),
                passage("b", "v1", 0, vec![0.7, 0.7]),
                passage("c", "v1", 0, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(&query(vec![1.0, 0.0], 2)).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].passage.document_id.as_str(), "a");
        assert_eq!(hits[1].passage.document_id.as_str(), "b");
        assert!(hits[0].vector_score >= hits[1].vector_score);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let store = InMemoryIndexStore::new();
        assert!(store.search(&query(vec![1.0], 5)).await.unwrap().is_empty());
        assert_eq!(store.committed_version(&DocumentId::new("x").unwrap()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_other_versions_and_filter() {
        let store = InMemoryIndexStore::new();
        store
            .upsert(vec![
                passage("a", "v1", 0, vec![1.0]),
                passage("a", "v1", 1, vec![1.0]),
                passage("a", "v2", 0, vec![1.0]),
                passage("b", "v1", 0, vec![1.0]),
            ])
            .await
            .unwrap();

        let doc = DocumentId::new("a").unwrap();
        let committed = store.committed_version(&doc).await.unwrap().unwrap();
        assert_eq!(committed.version.as_str(), "v2");
        assert_eq!(committed.passage_count, 1);
        assert_eq!(committed.superseded_passages, 2);
        assert!(committed.is_complete());

        let removed = store
            .delete_other_versions(&doc, &DocumentVersion::from_string("v2"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count(&SearchFilter::document(doc.clone())).await.unwrap(), 1);
        let committed = store.committed_version(&doc).await.unwrap().unwrap();
        assert_eq!(committed.superseded_passages, 0);

        assert_eq!(store.delete(&doc).await.unwrap(), 1);
        assert_eq!(store.count(&SearchFilter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_committed_version_reports_missing_chunks() {
        let store = InMemoryIndexStore::new();
        let mut first = passage("a", "v1", 0, vec![1.0]);
        first.chunk_count = 3;
        let mut third = passage("a", "v1", 2, vec![1.0]);
        third.chunk_count = 3;
        store.upsert(vec![first, third]).await.unwrap();

        let committed = store
            .committed_version(&DocumentId::new("a").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(committed.passage_count, 2);
        assert_eq!(committed.chunk_count, 3);
        assert!(!committed.is_complete());
    }
}
