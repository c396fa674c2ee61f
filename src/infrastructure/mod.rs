//! Infrastructure layer - External service implementations

pub mod blob;
pub mod embedding;
pub mod extractor;
pub mod http_client;
pub mod index;
pub mod ingestion;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod services;
