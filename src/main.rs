use clap::Parser;
use pmp_rag_pipeline::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let backend = cli.backend.backend();

    match cli.command {
        Command::Serve => cli::serve::run(backend).await,
        Command::Ingest(args) => cli::ingest::run(args, backend).await,
        Command::Ask(args) => cli::ask::run(args, backend).await,
    }
}
