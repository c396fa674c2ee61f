//! Ingest command - one batch ingestion run

use clap::Args;
use tracing::info;

use crate::domain::ingestion::DocumentSource;
use crate::Backend;

#[derive(Args, Clone, Debug)]
#[command(group = clap::ArgGroup::new("source").required(true).args(["prefix", "keys"]))]
pub struct IngestArgs {
    /// Ingest every key under this storage prefix ("" for all)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Ingest this key (repeatable)
    #[arg(long = "key")]
    pub keys: Vec<String>,
}

impl IngestArgs {
    fn source(&self) -> DocumentSource {
        match &self.prefix {
            Some(prefix) => DocumentSource::Prefix(prefix.clone()),
            None => DocumentSource::Keys(self.keys.clone()),
        }
    }
}

/// Run ingestion to completion and print the report as JSON.
/// Fails when any document failed.
pub async fn run(args: IngestArgs, backend: Backend) -> anyhow::Result<()> {
    let config = super::load_config(&backend)?;
    let state = crate::create_app_state(&config, &backend).await?;

    let report = state.ingestion.run(args.source()).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(
        documents = report.total_documents(),
        succeeded = report.succeeded(),
        partially_failed = report.partially_failed(),
        failed = report.failed(),
        unchanged = report.unchanged(),
        passages = report.total_passages_indexed(),
        "Ingestion finished"
    );

    if report.failed() > 0 {
        anyhow::bail!("{} of {} documents failed", report.failed(), report.total_documents());
    }

    Ok(())
}
