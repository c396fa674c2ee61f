//! Query-time retrieval: embed, hybrid search, re-rank, filter.
//!
//! Scores combine the store's vector similarity with a keyword signal:
//!
//! ```text
//! score = (w_v * vector + w_k * keyword) / (w_v + w_k)
//! ```
//!
//! The keyword signal is the store's own keyword score, min-max normalised
//! over the candidate set, when the store reports one. Otherwise it is the
//! fraction of distinct query terms the passage contains.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::document::DocumentId;
use super::embedding::EmbeddingProvider;
use super::error::{DomainError, Stage};
use super::index::{DocumentVersion, IndexStore, IndexedPassage, PassageId, SearchFilter, SearchQuery};
use super::retry::RetryPolicy;

/// Weights of the two ranking signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub vector: f32,
    pub keyword: f32,
}

impl HybridWeights {
    pub fn new(vector: f32, keyword: f32) -> Self {
        Self { vector, keyword }
    }

    /// Pure vector ranking
    pub fn vector_only() -> Self {
        Self::new(1.0, 0.0)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.vector < 0.0 || self.keyword < 0.0 {
            return Err(DomainError::invalid_config("hybrid weights must be non-negative"));
        }
        if self.vector + self.keyword <= 0.0 {
            return Err(DomainError::invalid_config("hybrid weights cannot both be zero"));
        }
        Ok(())
    }

    pub fn combine(&self, vector: f32, keyword: f32) -> f32 {
        (self.vector * vector + self.keyword * keyword) / (self.vector + self.keyword)
    }

    fn uses_keywords(&self) -> bool {
        self.keyword > 0.0
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::new(0.7, 0.3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Embedding model the index was built with
    pub embedding_model: String,
    pub top_k: usize,
    /// Passages scoring below this are discarded
    pub min_relevance: f32,
    pub weights: HybridWeights,
    /// Candidates fetched per requested passage before re-ranking
    pub candidate_multiplier: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            embedding_model: String::new(),
            top_k: 5,
            min_relevance: 0.0,
            weights: HybridWeights::default(),
            candidate_multiplier: 3,
        }
    }
}

/// One ranked passage of a retrieval
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub passage: IndexedPassage,
    /// Combined relevance
    pub score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
}

impl RetrievedPassage {
    pub fn id(&self) -> &PassageId {
        &self.passage.id
    }
}

/// Ranked passages for one query, most relevant first
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub passages: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievedPassage> {
        self.passages.iter()
    }

    pub fn ids(&self) -> Vec<&PassageId> {
        self.passages.iter().map(|p| p.id()).collect()
    }
}

/// Embeds queries and ranks index passages against them
#[derive(Debug, Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn IndexStore>,
    config: RetrieverConfig,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn IndexStore>,
        config: RetrieverConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve with the configured `top_k` and no filter
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievalResult, DomainError> {
        self.retrieve(query, self.config.top_k as i64, &SearchFilter::default())
            .await
    }

    #[instrument(skip(self, filter), fields(query_len = query.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        k: i64,
        filter: &SearchFilter,
    ) -> Result<RetrievalResult, DomainError> {
        if k <= 0 {
            return Err(DomainError::invalid_argument(format!(
                "k must be positive, got {}",
                k
            )));
        }
        if query.trim().is_empty() {
            return Err(DomainError::invalid_argument("query cannot be empty"));
        }
        self.check_model()?;

        let k = k as usize;
        let provider = self.embedder.provider_name();
        let texts = [query.to_string()];
        let mut vectors = self
            .retry
            .run(Stage::Embedding, provider, || self.embedder.embed(&texts))
            .await?;

        let vector = vectors
            .pop()
            .ok_or_else(|| DomainError::internal("embedding provider returned no vector"))?;
        if vector.dimensions() != self.embedder.dimensions() {
            return Err(DomainError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: vector.dimensions(),
            });
        }

        let weights = self.config.weights;
        let candidates = if weights.uses_keywords() {
            k.saturating_mul(self.config.candidate_multiplier.max(1))
        } else {
            k
        };
        let search = SearchQuery {
            vector,
            text: weights.uses_keywords().then(|| query.to_string()),
            filter: filter.clone(),
            k: candidates,
        };

        let store_provider = self.store.provider_name();
        let hits = self
            .retry
            .run(Stage::Search, store_provider, || self.store.search(&search))
            .await?;

        if hits.is_empty() {
            debug!("Index returned no candidates");
            return Ok(RetrievalResult::empty());
        }

        if let Some(stale) = hits
            .iter()
            .find(|h| h.passage.embedding_model != self.embedder.model())
        {
            return Err(DomainError::configuration(format!(
                "index passages were embedded with '{}' but queries use '{}'",
                stale.passage.embedding_model,
                self.embedder.model()
            )));
        }

        let store_keywords: Vec<Option<f32>> = hits.iter().map(|h| h.keyword_score).collect();
        let keyword_scores = if store_keywords.iter().any(Option::is_some) {
            normalize_scores(&store_keywords)
        } else {
            let terms = query_terms(query);
            hits.iter()
                .map(|h| term_overlap(&terms, &h.passage.text))
                .collect()
        };

        let newest = newest_versions(hits.iter().map(|h| &h.passage));

        let mut passages: Vec<RetrievedPassage> = hits
            .into_iter()
            .zip(keyword_scores)
            .filter(|(h, _)| newest.get(&h.passage.document_id) == Some(&h.passage.version))
            .map(|(h, keyword)| {
                let keyword = if weights.uses_keywords() { keyword } else { 0.0 };
                RetrievedPassage {
                    score: weights.combine(h.vector_score, keyword),
                    vector_score: h.vector_score,
                    keyword_score: keyword,
                    passage: h.passage,
                }
            })
            .filter(|p| p.score >= self.config.min_relevance)
            .collect();

        passages.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.passage.document_id.cmp(&b.passage.document_id))
                .then_with(|| a.passage.sequence.cmp(&b.passage.sequence))
        });
        passages.truncate(k);

        debug!(returned = passages.len(), "Retrieval complete");

        Ok(RetrievalResult { passages })
    }

    fn check_model(&self) -> Result<(), DomainError> {
        let configured = &self.config.embedding_model;
        if !configured.is_empty() && configured != self.embedder.model() {
            return Err(DomainError::configuration(format!(
                "retriever configured for embedding model '{}' but provider serves '{}'",
                configured,
                self.embedder.model()
            )));
        }
        Ok(())
    }
}

fn newest_versions<'a>(
    passages: impl Iterator<Item = &'a IndexedPassage>,
) -> HashMap<DocumentId, DocumentVersion> {
    let mut newest: HashMap<DocumentId, DocumentVersion> = HashMap::new();
    for p in passages {
        match newest.get(&p.document_id) {
            Some(v) if *v >= p.version => {}
            _ => {
                newest.insert(p.document_id.clone(), p.version.clone());
            }
        }
    }
    newest
}

/// Lowercased alphanumeric terms
pub fn query_terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of `terms` present in `text`
pub fn term_overlap(terms: &HashSet<String>, text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let present = query_terms(text);
    terms.iter().filter(|t| present.contains(*t)).count() as f32 / terms.len() as f32
}

/// Min-max normalise to `[0, 1]`; missing scores become 0 and equal scores 1
pub fn normalize_scores(scores: &[Option<f32>]) -> Vec<f32> {
    let known = scores.iter().flatten();
    let min = known.clone().copied().fold(f32::INFINITY, f32::min);
    let max = known.copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    scores
        .iter()
        .map(|s| match s {
            None => 0.0,
            Some(_) if range <= f32::EPSILON => 1.0,
            Some(v) => (v - min) / range,
        })
        .collect()
}
