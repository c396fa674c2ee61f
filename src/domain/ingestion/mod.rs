//! Document ingestion domain types
//!
//! This module provides:
//! - the chunker that splits extracted text into overlapping passages
//! - per-document and batch ingestion reports
//! - the document source an ingestion run reads from

pub mod chunker;
pub mod report;
pub mod source;

pub use chunker::{split, BoundaryMode, Chunk, ChunkingConfig, Chunks};
pub use report::{DocumentReport, DocumentStatus, IngestionReport};
pub use source::DocumentSource;
