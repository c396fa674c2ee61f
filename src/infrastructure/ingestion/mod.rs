//! Document ingestion infrastructure

mod pipeline;

pub use pipeline::{IngestionConfig, IngestionPipeline};
