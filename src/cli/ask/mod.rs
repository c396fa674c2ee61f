//! Ask command - answer one question and print the response

use clap::Args;
use tracing::info;

use crate::domain::ingestion::DocumentSource;
use crate::Backend;

#[derive(Args, Clone, Debug)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,
}

/// Print the `AnswerResponse` as JSON. An answer carrying an error exits non-zero.
pub async fn run(args: AskArgs, backend: Backend) -> anyhow::Result<()> {
    let config = super::load_config(&backend)?;
    let state = crate::create_app_state(&config, &backend).await?;

    // A fresh in-memory index is empty until its seed documents are ingested
    if matches!(backend, Backend::InMemory { data_dir: Some(_) }) {
        let report = state.ingestion.run(DocumentSource::prefix("")).await?;
        info!(
            documents = report.total_documents(),
            passages = report.total_passages_indexed(),
            "Indexed seed documents"
        );
    }

    let response = state.orchestrator.answer(&args.question, &[]).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Some(error) = &response.error {
        anyhow::bail!("{}: {}", error.code.as_str(), error.reason);
    }

    Ok(())
}
