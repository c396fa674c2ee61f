//! Application settings

mod app_config;

pub use app_config::{
    AppConfig, AzureConfig, IngestionSettings, LogFormat, LoggingConfig, RagSettings,
    RetrySettings, ServerConfig,
};
