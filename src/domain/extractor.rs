//! Text extraction contract

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

use super::document::ExtractionMetadata;
use super::error::ProviderError;

/// Plain text plus layout information pulled out of a raw file
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

impl Extraction {
    pub fn new(text: impl Into<String>, metadata: ExtractionMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Converts raw files (PDF, scans, text) into plain text
#[async_trait]
pub trait Extractor: Send + Sync + Debug {
    /// Extract `bytes`, whose MIME type was guessed as `content_type`.
    ///
    /// Fails with `UnsupportedFormat` or, when the analysis does not finish
    /// in time, `Timeout`.
    async fn extract(&self, bytes: &Bytes, content_type: &str) -> Result<Extraction, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

/// MIME type for a storage key, from its extension
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
