//! Generation provider implementations

mod azure_openai;
mod extractive;

pub use azure_openai::{AzureOpenAiConfig, AzureOpenAiProvider};
pub use extractive::ExtractiveGenerationProvider;
