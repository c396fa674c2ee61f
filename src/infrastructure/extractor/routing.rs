//! Picks an extractor by content type

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::PlainTextExtractor;
use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};
use crate::domain::extractor::{Extraction, Extractor};

/// Formats the layout model accepts
const LAYOUT_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

/// Text formats stay local; PDFs, scans and Office files go to the layout
/// extractor; anything else is `UnsupportedFormat`.
#[derive(Debug, Clone)]
pub struct RoutingExtractor {
    local: PlainTextExtractor,
    layout: Option<Arc<dyn Extractor>>,
}

impl RoutingExtractor {
    pub fn new(layout: Arc<dyn Extractor>) -> Self {
        Self {
            local: PlainTextExtractor::new(),
            layout: Some(layout),
        }
    }

    /// Only text formats are accepted
    pub fn local_only() -> Self {
        Self {
            local: PlainTextExtractor::new(),
            layout: None,
        }
    }

    fn needs_layout(content_type: &str) -> bool {
        content_type.starts_with("image/") || LAYOUT_TYPES.contains(&content_type)
    }
}

#[async_trait]
impl Extractor for RoutingExtractor {
    async fn extract(&self, bytes: &Bytes, content_type: &str) -> Result<Extraction, ProviderError> {
        if self.local.supports(content_type) {
            debug!(content_type, "Extracting locally");
            return self.local.extract(bytes, content_type).await;
        }

        match &self.layout {
            Some(layout) if Self::needs_layout(content_type) => {
                debug!(content_type, provider = layout.provider_name(), "Extracting with layout model");
                layout.extract(bytes, content_type).await
            }
            _ => Err(ProviderError::new(
                Stage::Extraction,
                self.provider_name(),
                ProviderErrorKind::UnsupportedFormat,
                format!("Unsupported content type '{}'", content_type),
            )),
        }
    }

    fn provider_name(&self) -> &'static str {
        "routing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::extractor::mock::MockExtractor;

    #[tokio::test]
    async fn test_routes_by_content_type() {
        let router = RoutingExtractor::new(Arc::new(MockExtractor::new()));

        let text = router
            .extract(&Bytes::from("# Title"), "text/markdown")
            .await
            .unwrap();
        assert_eq!(text.metadata.model.as_deref(), Some("plain_text"));

        let pdf = router
            .extract(&Bytes::from("page one"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(pdf.metadata.model.as_deref(), Some("mock"));

        let scan = router.extract(&Bytes::from("scan"), "image/png").await.unwrap();
        assert_eq!(scan.metadata.model.as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn test_unknown_binary_is_unsupported() {
        let router = RoutingExtractor::new(Arc::new(MockExtractor::new()));
        let err = router
            .extract(&Bytes::from_static(&[0, 1, 2]), "application/octet-stream")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::UnsupportedFormat);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_local_only_rejects_pdf() {
        let err = RoutingExtractor::local_only()
            .extract(&Bytes::from("%PDF"), "application/pdf")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::UnsupportedFormat);
    }
}
