//! `rag`: ingest the configured wiki space, or answer one question.
//!
//! ```text
//! rag                      # run ingestion
//! rag -q "How do I ..."    # answer a question
//! ```

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use rag_core::confluence::ConfluenceLoader;
use rag_core::openai::{OpenAiEmbedder, OpenAiGenerator};
use rag_core::pgvector::PgVectorStore;
use rag_core::{
    ConfigProvider, Embedder, EnvCredentialProvider, FileConfig, IngestOutcome, RagConfig,
    RagPipeline, TwoStageChunker,
};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Parser)]
#[command(name = "rag", version, about = "Retrieval-augmented question answering over a wiki space")]
struct Cli {
    /// Answer this question instead of running ingestion
    #[arg(short, long)]
    query: Option<String>,
}

/// `RAG_CONFIG_PATH` when set and non-empty, otherwise `config/config.yaml`.
fn config_path(env_value: Option<String>) -> PathBuf {
    env_value
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_logging()?;

    let path = config_path(std::env::var("RAG_CONFIG_PATH").ok());
    let settings: Arc<dyn ConfigProvider> = Arc::new(
        FileConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
    );
    let credentials = EnvCredentialProvider::new(settings.clone());
    let rag_config = RagConfig::from_provider(settings.as_ref())?;

    let embedder: Arc<dyn Embedder> =
        Arc::new(OpenAiEmbedder::from_provider(&credentials, &settings.embeddings_config())?);
    let generator = Arc::new(OpenAiGenerator::from_provider(&credentials, &settings.llm_config())?);
    let store = Arc::new(PgVectorStore::connect(&settings.database_config(), embedder.clone()).await?);
    let loader = Arc::new(ConfluenceLoader::new(&settings.document_source_config())?);
    let chunker = Arc::new(TwoStageChunker::new(&rag_config.chunking));

    let pipeline = RagPipeline::builder()
        .config(rag_config)
        .loader(loader)
        .chunker(chunker)
        .embedder(embedder)
        .vector_store(store.clone())
        .generator(generator)
        .build()?;

    if let Some(query) = cli.query.as_deref() {
        let answer = pipeline.query(query).await;
        println!("Response: {answer}");
        return Ok(());
    }

    store.create_collection().await?;
    match pipeline.ingest().await? {
        IngestOutcome::Exhausted(stats) => {
            info!(
                batches = stats.batches,
                documents = stats.documents,
                chunks = stats.chunks,
                "ingestion finished"
            );
            Ok(())
        }
        IngestOutcome::Failed { stage, reason, stats } => {
            error!(%stage, chunks = stats.chunks, "ingestion aborted");
            bail!("ingestion failed during {stage}: {reason}")
        }
    }
}
