//! Azure AI Search index store
//!
//! Passages are stored one search document per passage. Hybrid queries send
//! the keyword text and a vector query together; the vector field is
//! retrieved so the vector score is exact cosine similarity, and
//! `@search.score` is reported as the keyword signal.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::document::DocumentId;
use crate::domain::embedding::{cosine_similarity, EmbeddingVector};
use crate::domain::error::{ProviderError, Stage};
use crate::domain::index::{
    CommittedVersion, DocumentVersion, IndexStore, IndexedPassage, PassageId, ScoredPassage,
    SearchFilter, SearchQuery,
};
use crate::infrastructure::http_client::HttpClientTrait;

const PROVIDER: &str = "azure_search";
const API_VERSION: &str = "2023-11-01";
/// Service limit for one indexing request
const MAX_BATCH: usize = 1000;
const SELECT_FIELDS: &str = "id,document_id,version,sequence,content,start_offset,end_offset,page,content_vector,embedding_model,content_hash,chunk_count,metadata_tags";

#[derive(Debug, Clone)]
pub struct AzureSearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
}

impl AzureSearchConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            index_name: index_name.into(),
        }
    }
}

#[derive(Debug)]
pub struct AzureSearchIndexStore<C: HttpClientTrait> {
    client: C,
    config: AzureSearchConfig,
}

impl<C: HttpClientTrait> AzureSearchIndexStore<C> {
    pub fn new(client: C, config: AzureSearchConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index_name,
            operation,
            API_VERSION
        )
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("api-key", self.config.api_key.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    async fn post(
        &self,
        operation: &str,
        stage: Stage,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        self.client
            .post_json(&self.url(operation), self.headers(), body)
            .await
            .map_err(|e| e.into_provider(stage, PROVIDER))
    }

    async fn index_batch(
        &self,
        actions: Vec<serde_json::Value>,
    ) -> Result<usize, ProviderError> {
        let mut written = 0;

        for batch in actions.chunks(MAX_BATCH) {
            let json = self
                .post("docs/index", Stage::Indexing, &serde_json::json!({ "value": batch }))
                .await?;
            let response: IndexResponse = parse(json, Stage::Indexing)?;

            if let Some(failed) = response.value.iter().find(|r| !r.status) {
                return Err(ProviderError::invalid_input(
                    Stage::Indexing,
                    PROVIDER,
                    format!(
                        "indexing failed for key {}: {}",
                        failed.key,
                        failed.error_message.as_deref().unwrap_or("unknown error")
                    ),
                ));
            }
            written += response.value.len();
        }

        Ok(written)
    }

    async fn keys_matching(&self, filter: &str) -> Result<Vec<String>, ProviderError> {
        let mut keys = Vec::new();

        loop {
            let body = serde_json::json!({
                "search": "*",
                "filter": filter,
                "select": "id",
                "top": MAX_BATCH,
                "skip": keys.len(),
            });
            let response: SearchResponse<KeyOnly> =
                parse(self.post("docs/search", Stage::Indexing, &body).await?, Stage::Indexing)?;

            let page = response.value.len();
            keys.extend(response.value.into_iter().map(|d| d.id));
            if page < MAX_BATCH {
                return Ok(keys);
            }
        }
    }

    async fn delete_matching(&self, filter: String) -> Result<usize, ProviderError> {
        let keys = self.keys_matching(&filter).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let actions = keys
            .into_iter()
            .map(|id| serde_json::json!({ "@search.action": "delete", "id": id }))
            .collect();

        self.index_batch(actions).await
    }

    async fn count_matching(&self, filter: Option<String>) -> Result<usize, ProviderError> {
        let mut body = serde_json::json!({ "search": "*", "count": true, "top": 0 });
        if let Some(filter) = filter {
            body["filter"] = serde_json::json!(filter);
        }

        let response: SearchResponse<KeyOnly> =
            parse(self.post("docs/search", Stage::Search, &body).await?, Stage::Search)?;
        Ok(response.count.unwrap_or(0))
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    json: serde_json::Value,
    stage: Stage,
) -> Result<T, ProviderError> {
    serde_json::from_value(json).map_err(|e| {
        ProviderError::malformed(stage, PROVIDER, format!("Failed to parse response: {}", e))
    })
}

/// OData string literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn document_filter(document_id: &DocumentId) -> String {
    format!("document_id eq {}", quote(document_id.as_str()))
}

/// Translate a search filter to an OData expression
pub fn odata_filter(filter: &SearchFilter) -> Option<String> {
    let mut clauses = Vec::new();

    match filter.document_ids.as_slice() {
        [] => {}
        [single] => clauses.push(document_filter(single)),
        many => {
            let any: Vec<String> = many.iter().map(document_filter).collect();
            clauses.push(format!("({})", any.join(" or ")));
        }
    }

    for (key, value) in &filter.metadata {
        clauses.push(format!(
            "metadata_tags/any(t: t eq {})",
            quote(&format!("{}={}", key, value))
        ));
    }

    (!clauses.is_empty()).then(|| clauses.join(" and "))
}

#[async_trait]
impl<C: HttpClientTrait> IndexStore for AzureSearchIndexStore<C> {
    async fn upsert(&self, passages: Vec<IndexedPassage>) -> Result<usize, ProviderError> {
        let actions = passages
            .into_iter()
            .map(|p| {
                let mut value =
                    serde_json::to_value(SearchDocument::from_passage(p)).map_err(|e| {
                        ProviderError::invalid_input(Stage::Indexing, PROVIDER, e.to_string())
                    })?;
                value["@search.action"] = serde_json::json!("mergeOrUpload");
                Ok(value)
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        self.index_batch(actions).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredPassage>, ProviderError> {
        let mut body = serde_json::json!({
            "search": query.text.as_deref().unwrap_or("*"),
            "select": SELECT_FIELDS,
            "top": query.k,
            "vectorQueries": [{
                "kind": "vector",
                "vector": query.vector.as_slice(),
                "fields": "content_vector",
                "k": query.k,
            }],
        });
        if let Some(filter) = odata_filter(&query.filter) {
            body["filter"] = serde_json::json!(filter);
        }

        let response: SearchResponse<SearchHit> =
            parse(self.post("docs/search", Stage::Search, &body).await?, Stage::Search)?;
        debug!(hits = response.value.len(), "Azure AI Search returned");

        response
            .value
            .into_iter()
            .map(|hit| {
                let keyword_score = query.text.as_ref().map(|_| hit.score);
                let passage = hit.document.into_passage()?;
                Ok(ScoredPassage {
                    vector_score: cosine_similarity(
                        query.vector.as_slice(),
                        passage.vector.as_slice(),
                    )
                    .max(0.0),
                    keyword_score,
                    passage,
                })
            })
            .collect()
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<usize, ProviderError> {
        self.delete_matching(document_filter(document_id)).await
    }

    async fn delete_other_versions(
        &self,
        document_id: &DocumentId,
        keep: &DocumentVersion,
    ) -> Result<usize, ProviderError> {
        self.delete_matching(format!(
            "{} and version ne {}",
            document_filter(document_id),
            quote(keep.as_str())
        ))
        .await
    }

    async fn delete_version(
        &self,
        document_id: &DocumentId,
        version: &DocumentVersion,
    ) -> Result<usize, ProviderError> {
        self.delete_matching(format!(
            "{} and version eq {}",
            document_filter(document_id),
            quote(version.as_str())
        ))
        .await
    }

    async fn committed_version(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<CommittedVersion>, ProviderError> {
        let body = serde_json::json!({
            "search": "*",
            "filter": document_filter(document_id),
            "orderby": "version desc",
            "select": "version,content_hash,embedding_model,chunk_count",
            "top": 1,
        });
        let response: SearchResponse<VersionHit> =
            parse(self.post("docs/search", Stage::Indexing, &body).await?, Stage::Indexing)?;

        let Some(newest) = response.value.into_iter().next() else {
            return Ok(None);
        };

        let passage_count = self
            .count_matching(Some(format!(
                "{} and version eq {}",
                document_filter(document_id),
                quote(&newest.version)
            )))
            .await?;
        let superseded_passages = self
            .count_matching(Some(format!(
                "{} and version ne {}",
                document_filter(document_id),
                quote(&newest.version)
            )))
            .await?;

        Ok(Some(CommittedVersion {
            version: DocumentVersion::from_string(newest.version),
            content_hash: newest.content_hash,
            embedding_model: newest.embedding_model,
            passage_count,
            chunk_count: newest.chunk_count.max(0) as usize,
            superseded_passages,
        }))
    }

    async fn count(&self, filter: &SearchFilter) -> Result<usize, ProviderError> {
        self.count_matching(odata_filter(filter)).await
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!(
            "{}/indexes/{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index_name,
            API_VERSION
        );
        match self.client.get(&url, self.headers()).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind.is_retryable() => Ok(false),
            Err(e) => Err(e.into_provider(Stage::Search, PROVIDER)),
        }
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// Azure AI Search document shape

#[derive(Debug, Serialize, Deserialize)]
struct SearchDocument {
    id: String,
    document_id: String,
    version: String,
    sequence: i64,
    content: String,
    start_offset: i64,
    end_offset: i64,
    page: Option<i32>,
    content_vector: Vec<f32>,
    embedding_model: String,
    content_hash: String,
    #[serde(default)]
    chunk_count: i64,
    #[serde(default)]
    metadata_tags: Vec<String>,
}

impl SearchDocument {
    fn from_passage(p: IndexedPassage) -> Self {
        Self {
            id: p.id.to_string(),
            document_id: p.document_id.to_string(),
            version: p.version.to_string(),
            sequence: p.sequence as i64,
            content: p.text,
            start_offset: p.start as i64,
            end_offset: p.end as i64,
            page: p.page.map(|n| n as i32),
            content_vector: p.vector.into_inner(),
            embedding_model: p.embedding_model,
            content_hash: p.content_hash,
            chunk_count: p.chunk_count as i64,
            metadata_tags: p
                .metadata
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
        }
    }

    fn into_passage(self) -> Result<IndexedPassage, ProviderError> {
        let document_id = DocumentId::new(self.document_id).map_err(|e| {
            ProviderError::malformed(Stage::Search, PROVIDER, e.to_string())
        })?;

        let metadata: BTreeMap<String, String> = self
            .metadata_tags
            .iter()
            .filter_map(|t| t.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(IndexedPassage {
            id: PassageId::from_string(self.id),
            document_id,
            version: DocumentVersion::from_string(self.version),
            sequence: self.sequence.max(0) as usize,
            text: self.content,
            start: self.start_offset.max(0) as usize,
            end: self.end_offset.max(0) as usize,
            page: self.page.map(|n| n.max(0) as u32),
            vector: EmbeddingVector::new(self.content_vector),
            embedding_model: self.embedding_model,
            content_hash: self.content_hash,
            chunk_count: self.chunk_count.max(0) as usize,
            metadata,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(rename = "@odata.count")]
    count: Option<usize>,
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score")]
    score: f32,
    #[serde(flatten)]
    document: SearchDocument,
}

#[derive(Debug, Deserialize)]
struct KeyOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VersionHit {
    version: String,
    content_hash: String,
    embedding_model: String,
    #[serde(default)]
    chunk_count: i64,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    value: Vec<IndexResult>,
}

#[derive(Debug, Deserialize)]
struct IndexResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}
