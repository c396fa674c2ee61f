use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::document::{content_hash, DocumentId};
use crate::domain::embedding::EmbeddingVector;

static LAST_VERSION_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Tag shared by all passages written in one ingestion run of a document.
///
/// Versions sort lexicographically in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentVersion(String);

impl DocumentVersion {
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis().max(0);
        // Strictly increasing within the process, even inside one millisecond
        let millis = LAST_VERSION_MILLIS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(now.max(prev + 1)))
            .map_or(now, |prev| now.max(prev + 1));
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{:013}-{}", millis, &suffix[..8]))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index key of a passage; only URL-safe characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassageId(String);

impl PassageId {
    pub fn new(document_id: &DocumentId, version: &DocumentVersion, sequence: usize) -> Self {
        let doc = content_hash(document_id.as_str().as_bytes());
        Self(format!("{}_{}_{}", &doc[..16], version, sequence))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PassageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chunk plus its vector and denormalized provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPassage {
    pub id: PassageId,
    pub document_id: DocumentId,
    pub version: DocumentVersion,
    /// Chunk sequence within the document
    pub sequence: usize,
    pub text: String,
    /// Byte offsets into the document's extracted text
    pub start: usize,
    pub end: usize,
    /// Page on which the passage starts
    pub page: Option<u32>,
    pub vector: EmbeddingVector,
    pub embedding_model: String,
    /// SHA-256 of the source file
    pub content_hash: String,
    /// Chunks the document was split into for this version
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl IndexedPassage {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_sort_in_creation_order() {
        let first = DocumentVersion::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = DocumentVersion::generate();
        assert!(first < second);
    }

    #[test]
    fn test_passage_id_is_key_safe() {
        let doc = DocumentId::new("invoices/2024/March report.pdf").unwrap();
        let version = DocumentVersion::from_string("0000000000001-abcd1234");
        let id = PassageId::new(&doc, &version, 7);

        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert!(id.as_str().ends_with("_0000000000001-abcd1234_7"));
    }
}
