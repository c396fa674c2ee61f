//! Source documents and their extraction metadata

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::DomainError;

/// Identity of a source document (its blob key or path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if id.trim().is_empty() {
            return Err(DomainError::invalid_argument("document id cannot be empty"));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Byte range of one page within the extracted text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    /// 1-based page number
    pub page_number: u32,
    pub start: usize,
    pub end: usize,
}

/// Layout information returned alongside extracted text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<PageSpan>,
    /// Name of the extraction model or strategy used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ExtractionMetadata {
    /// Page on which the byte offset `pos` falls
    pub fn page_at(&self, pos: usize) -> Option<u32> {
        self.pages
            .iter()
            .find(|p| pos >= p.start && pos < p.end)
            .or_else(|| self.pages.last().filter(|p| pos >= p.end))
            .map(|p| p.page_number)
    }
}

/// A fetched and extracted document; immutable once built
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    raw: Bytes,
    text: String,
    metadata: ExtractionMetadata,
    content_hash: String,
}

impl Document {
    pub fn new(id: DocumentId, raw: Bytes, text: String, metadata: ExtractionMetadata) -> Self {
        let content_hash = content_hash(&raw);
        Self {
            id,
            raw,
            text,
            metadata,
            content_hash,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &ExtractionMetadata {
        &self.metadata
    }

    /// SHA-256 of the raw bytes, hex encoded
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

/// SHA-256 fingerprint of a file, used to detect unchanged re-uploads
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_rejects_blank() {
        assert!(DocumentId::new("  ").is_err());
        assert_eq!(DocumentId::new("docs/a.pdf").unwrap().as_str(), "docs/a.pdf");
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(b"invoice");
        assert_eq!(a, content_hash(b"invoice"));
        assert_ne!(a, content_hash(b"invoice2"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_page_at() {
        let metadata = ExtractionMetadata {
            page_count: 2,
            pages: vec![
                PageSpan { page_number: 1, start: 0, end: 10 },
                PageSpan { page_number: 2, start: 10, end: 25 },
            ],
            ..Default::default()
        };

        assert_eq!(metadata.page_at(0), Some(1));
        assert_eq!(metadata.page_at(12), Some(2));
        assert_eq!(metadata.page_at(25), Some(2));
        assert_eq!(ExtractionMetadata::default().page_at(3), None);
    }
}
