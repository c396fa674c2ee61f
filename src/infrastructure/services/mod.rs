//! Infrastructure services

mod ingestion_service;

pub use ingestion_service::{IngestionJob, IngestionService, JobId, JobStatus};
