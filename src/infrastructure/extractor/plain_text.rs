//! Local extraction for text formats

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::document::ExtractionMetadata;
use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};
use crate::domain::extractor::{Extraction, Extractor};

const PROVIDER: &str = "plain_text";

/// Decodes UTF-8 text, Markdown and JSON files as-is
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(&self, content_type: &str) -> bool {
        content_type.starts_with("text/")
            || content_type == "application/json"
            || content_type.ends_with("+json")
            || content_type == "application/xml"
    }
}

#[async_trait]
impl Extractor for PlainTextExtractor {
    async fn extract(&self, bytes: &Bytes, content_type: &str) -> Result<Extraction, ProviderError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ProviderError::new(
                Stage::Extraction,
                PROVIDER,
                ProviderErrorKind::UnsupportedFormat,
                format!("{} content is not valid UTF-8: {}", content_type, e),
            )
        })?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        Ok(Extraction::new(
            text.replace("\r\n", "\n"),
            ExtractionMetadata {
                content_type: Some(content_type.to_string()),
                page_count: 0,
                pages: Vec::new(),
                model: Some(PROVIDER.to_string()),
            },
        ))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_text() {
        let extraction = PlainTextExtractor::new()
            .extract(&Bytes::from("\u{feff}line one\r\nline two"), "text/plain")
            .await
            .unwrap();

        assert_eq!(extraction.text, "line one\nline two");
        assert_eq!(extraction.metadata.content_type.as_deref(), Some("text/plain"));
        assert!(extraction.metadata.pages.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_unsupported() {
        let err = PlainTextExtractor::new()
            .extract(&Bytes::from_static(&[0xff, 0xfe, 0x00]), "text/plain")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::UnsupportedFormat);
        assert_eq!(err.stage, Stage::Extraction);
    }

    #[test]
    fn test_supports() {
        let extractor = PlainTextExtractor::new();
        assert!(extractor.supports("text/markdown"));
        assert!(extractor.supports("application/json"));
        assert!(!extractor.supports("application/pdf"));
    }
}
