//! Ingestion outcome types

use serde::{Deserialize, Serialize};

use crate::domain::error::Stage;

/// Outcome of ingesting a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Every chunk was embedded and committed
    Succeeded,
    /// Some chunks could not be embedded; the rest were committed
    PartiallyFailed { failed_chunk_count: usize },
    /// Nothing was committed for this document
    Failed { stage: Stage, reason: String },
    /// The index already holds this exact content
    Unchanged,
}

impl DocumentStatus {
    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::PartiallyFailed { .. } => "partially_failed",
            Self::Failed { .. } => "failed",
            Self::Unchanged => "unchanged",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Unchanged)
    }
}

/// Per-document entry of an [`IngestionReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: String,
    #[serde(flatten)]
    pub status: DocumentStatus,
    /// Passages committed to the index for this document
    pub passages_indexed: usize,
    /// Passages of earlier versions removed by the swap
    pub passages_replaced: usize,
}

impl DocumentReport {
    pub fn new(document_id: impl Into<String>, status: DocumentStatus) -> Self {
        Self {
            document_id: document_id.into(),
            status,
            passages_indexed: 0,
            passages_replaced: 0,
        }
    }

    pub fn with_passages(mut self, indexed: usize, replaced: usize) -> Self {
        self.passages_indexed = indexed;
        self.passages_replaced = replaced;
        self
    }
}

/// Result of an ingestion run over one or more documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub documents: Vec<DocumentReport>,
}

impl IngestionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: DocumentReport) {
        self.documents.push(report);
    }

    pub fn total_documents(&self) -> usize {
        self.documents.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Succeeded))
    }

    pub fn partially_failed(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::PartiallyFailed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Unchanged))
    }

    pub fn total_passages_indexed(&self) -> usize {
        self.documents.iter().map(|d| d.passages_indexed).sum()
    }

    pub fn is_success(&self) -> bool {
        self.documents.iter().all(|d| d.status.is_success())
    }

    pub fn get(&self, document_id: &str) -> Option<&DocumentReport> {
        self.documents.iter().find(|d| d.document_id == document_id)
    }

    /// Order entries by document id so reports are reproducible across worker scheduling
    pub fn sorted(mut self) -> Self {
        self.documents
            .sort_by(|a, b| a.document_id.cmp(&b.document_id));
        self
    }

    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.status)).count()
    }
}
