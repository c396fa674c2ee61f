//! Azure AI Document Intelligence layout extraction
//!
//! Analysis is asynchronous on the service side: the file is posted to the
//! `prebuilt-layout` model, which answers `202 Accepted` with an
//! `Operation-Location` that is polled until the analysis settles.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::document::{ExtractionMetadata, PageSpan};
use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};
use crate::domain::extractor::{Extraction, Extractor};
use crate::infrastructure::http_client::HttpClientTrait;

const PROVIDER: &str = "document_intelligence";

#[derive(Debug, Clone)]
pub struct DocumentIntelligenceConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub api_version: String,
    pub poll_interval: Duration,
    /// Total time allowed for one analysis before `Timeout`
    pub max_wait: Duration,
}

impl DocumentIntelligenceConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: "prebuilt-layout".to_string(),
            api_version: "2024-11-30".to_string(),
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(120),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}&stringIndexType=unicodeCodePoint",
            self.endpoint.trim_end_matches('/'),
            self.model,
            self.api_version
        )
    }
}

#[derive(Debug)]
pub struct DocumentIntelligenceExtractor<C: HttpClientTrait> {
    client: C,
    config: DocumentIntelligenceConfig,
}

impl<C: HttpClientTrait> DocumentIntelligenceExtractor<C> {
    pub fn new(client: C, config: DocumentIntelligenceConfig) -> Self {
        Self { client, config }
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![("Ocp-Apim-Subscription-Key", self.config.api_key.as_str())]
    }

    async fn poll(&self, operation_url: &str) -> Result<AnalyzeResult, ProviderError> {
        let deadline = Instant::now() + self.config.max_wait;

        loop {
            let response = self
                .client
                .get(operation_url, self.headers())
                .await
                .map_err(|e| e.into_provider(Stage::Extraction, PROVIDER))?;
            let operation: AnalyzeOperation = response
                .json()
                .map_err(|e| e.into_provider(Stage::Extraction, PROVIDER))?;

            match operation.status.as_str() {
                "succeeded" => {
                    return operation.analyze_result.ok_or_else(|| {
                        ProviderError::malformed(
                            Stage::Extraction,
                            PROVIDER,
                            "succeeded without analyzeResult",
                        )
                    });
                }
                "failed" | "canceled" => {
                    let error = operation.error.unwrap_or_default();
                    let kind = if error.code.contains("Unsupported") || error.code == "InvalidContent" {
                        ProviderErrorKind::UnsupportedFormat
                    } else {
                        ProviderErrorKind::InvalidInput
                    };
                    return Err(ProviderError::new(
                        Stage::Extraction,
                        PROVIDER,
                        kind,
                        format!("Analysis {}: {} {}", operation.status, error.code, error.message),
                    ));
                }
                status => debug!(status, "Analysis still running"),
            }

            if Instant::now() + self.config.poll_interval > deadline {
                return Err(ProviderError::timeout(
                    Stage::Extraction,
                    PROVIDER,
                    format!("Analysis did not finish within {:?}", self.config.max_wait),
                ));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl<C: HttpClientTrait> Extractor for DocumentIntelligenceExtractor<C> {
    async fn extract(&self, bytes: &Bytes, content_type: &str) -> Result<Extraction, ProviderError> {
        let response = self
            .client
            .post_bytes(
                &self.config.analyze_url(),
                self.headers(),
                content_type,
                bytes.clone(),
            )
            .await
            .map_err(|e| e.into_provider(Stage::Extraction, PROVIDER))?;

        let operation_url = response
            .header("operation-location")
            .ok_or_else(|| {
                ProviderError::malformed(
                    Stage::Extraction,
                    PROVIDER,
                    "analyze response has no Operation-Location header",
                )
            })?
            .to_string();

        let result = self.poll(&operation_url).await?;
        let pages = page_spans(&result.content, &result.pages);

        debug!(
            pages = pages.len(),
            chars = result.content.len(),
            "Layout analysis finished"
        );

        Ok(Extraction::new(
            result.content,
            ExtractionMetadata {
                content_type: Some(content_type.to_string()),
                page_count: pages.len() as u32,
                pages,
                model: Some(self.config.model.clone()),
            },
        ))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Convert code-point spans from the service to byte ranges of `content`
fn page_spans(content: &str, pages: &[AnalyzedPage]) -> Vec<PageSpan> {
    let byte_offsets: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();
    let to_byte = |chars: usize| byte_offsets.get(chars).copied().unwrap_or(content.len());

    let mut spans: Vec<PageSpan> = pages
        .iter()
        .filter_map(|page| {
            let start = page.spans.iter().map(|s| s.offset).min()?;
            let end = page.spans.iter().map(|s| s.offset + s.length).max()?;
            Some(PageSpan {
                page_number: page.page_number,
                start: to_byte(start),
                end: to_byte(end),
            })
        })
        .collect();
    spans.sort_by_key(|s| s.start);
    spans
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<AnalyzeError>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
    #[serde(default)]
    pages: Vec<AnalyzedPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzedPage {
    page_number: u32,
    #[serde(default)]
    spans: Vec<Span>,
}

#[derive(Debug, Deserialize)]
struct Span {
    offset: usize,
    length: usize,
}
