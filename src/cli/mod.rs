//! CLI module for the RAG pipeline
//!
//! Subcommands:
//! - `serve`: HTTP function surface
//! - `ingest`: one batch ingestion run, printing the JSON report
//! - `ask`: one question, printing the JSON answer

pub mod ask;
pub mod ingest;
pub mod serve;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::error;

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::Backend;

/// PMP RAG Pipeline - question answering over private documents
#[derive(Parser)]
#[command(name = "pmp-rag-pipeline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Ingest documents from storage into the index
    Ingest(ingest::IngestArgs),

    /// Answer a single question
    Ask(ask::AskArgs),
}

/// Backend selection shared by every subcommand
#[derive(Args, Clone, Debug, Default)]
pub struct BackendArgs {
    /// Use in-memory index and storage with offline models; no Azure settings needed
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Seed in-memory storage from this directory (with --in-memory)
    #[arg(long, global = true, requires = "in_memory")]
    pub data_dir: Option<PathBuf>,
}

impl BackendArgs {
    pub fn backend(&self) -> Backend {
        if self.in_memory {
            Backend::InMemory {
                data_dir: self.data_dir.clone(),
            }
        } else {
            Backend::Azure
        }
    }
}

/// Load settings, initialise logging and run startup validation
pub fn load_config(backend: &Backend) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    if let Err(e) = config.validate(backend.is_in_memory()) {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    Ok(config)
}
