//! Embedding provider implementations

mod azure_openai;
mod local;

pub use azure_openai::{known_dimensions, AzureOpenAiEmbeddingProvider};
pub use local::{HashingEmbeddingProvider, LOCAL_EMBEDDING_MODEL};
