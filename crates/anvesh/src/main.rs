use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use anvesh::config::EngineConfig;
use anvesh::context::RetrievalContext;
use anvesh::embeddings::{Embedder, TfidfSvdEmbedder};
use anvesh::ingest::Ingestor;

#[derive(Parser)]
#[command(name = "anvesh", about = "Hybrid document retrieval engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the offline ingestion pipeline (full batch rebuild).
    Ingest {
        /// Path to the engine YAML config.
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Serve the retrieval HTTP API.
    Serve {
        /// Path to the engine YAML config.
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,
        /// Bind address, overriding `server.bind` from the config.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ingest { config } => {
            let config = EngineConfig::from_file(&config)?;
            let embedder = TfidfSvdEmbedder::load(&config.embedder.artifact)
                .context("Failed to load embedder artifact")?;
            let embedder: Arc<dyn Embedder> = Arc::new(embedder);

            let ingestor = Ingestor::new(config, embedder).await?;
            let stats = ingestor.run().await?;
            println!(
                "files={} chunks={} skipped={} exact_dups_skipped={} near_dups_skipped={}",
                stats.files,
                stats.chunks,
                stats.files_skipped,
                stats.exact_dups_skipped,
                stats.near_dups_skipped
            );
        }
        Command::Serve { config, bind } => {
            let config = EngineConfig::from_file(&config)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let ctx = RetrievalContext::initialize(config).await?;
            anvesh::server::serve(Arc::new(ctx), &bind).await?;
        }
    }
    Ok(())
}
