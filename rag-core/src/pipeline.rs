//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates batched ingestion (load → chunk → embed →
//! store) and cached query answering (search → prompt → generate) by
//! composing a [`DocumentLoader`], a [`Chunker`], an [`Embedder`], a
//! [`VectorStore`] and a [`TextGenerator`].
//!
//! Backend failures never escape the pipeline: ingestion reports them as
//! [`IngestOutcome::Failed`] and queries answer with
//! [`QUERY_FAILURE_MESSAGE`]. Both routes go through the configured
//! [`ErrorHandler`]. Precondition violations ([`RagError::InvalidInput`]) are
//! returned as errors instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_core::{RagPipeline, RagConfig, InMemoryVectorStore, TwoStageChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .loader(Arc::new(loader))
//!     .chunker(Arc::new(TwoStageChunker::default()))
//!     .embedder(embedder.clone())
//!     .vector_store(Arc::new(InMemoryVectorStore::new(embedder)))
//!     .generator(Arc::new(generator))
//!     .build()?;
//!
//! let outcome = pipeline.ingest().await?;
//! let answer = pipeline.query("How do I rotate credentials?").await;
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::Metadata;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::error_handler::{ErrorContext, ErrorHandler, IngestStage, LoggingErrorHandler};
use crate::generation::TextGenerator;
use crate::loader::{DocumentLoader, LoadOptions};
use crate::vectorstore::VectorStore;

/// The answer returned by [`RagPipeline::query`] when anything goes wrong.
pub const QUERY_FAILURE_MESSAGE: &str = "An error occurred while generating the response.";

/// Progress counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Non-empty pages received from the loader.
    pub batches: usize,
    pub documents: usize,
    /// Chunks embedded and stored.
    pub chunks: usize,
    /// Offset of the next load call (or of the failing one).
    pub next_offset: usize,
}

/// How an ingestion run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The loader returned an empty page.
    Exhausted(IngestStats),
    /// A backend failure aborted the run. Batches stored before the failure
    /// remain in the vector store.
    Failed {
        stage: IngestStage,
        reason: String,
        stats: IngestStats,
    },
}

impl IngestOutcome {
    pub fn stats(&self) -> &IngestStats {
        match self {
            IngestOutcome::Exhausted(stats) => stats,
            IngestOutcome::Failed { stats, .. } => stats,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, IngestOutcome::Exhausted(_))
    }
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. Calls are processed
/// sequentially: each stage completes before the next starts. Concurrent
/// [`ingest`](Self::ingest) calls on one pipeline are not coordinated.
pub struct RagPipeline {
    config: RagConfig,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    generator: Arc<dyn TextGenerator>,
    error_handler: Arc<dyn ErrorHandler>,
    load_options: LoadOptions,
    cache: ResponseCache,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Run the ingestion loop until the loader is exhausted or a stage fails.
    ///
    /// Pages are requested with `limit = batch_size` at offsets `0,
    /// batch_size, 2 * batch_size, …`; the loop ends only when a page comes
    /// back empty. A page that yields no chunks is skipped without calling
    /// the embedder or the store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if a component reports a
    /// precondition violation (for example a document with empty content).
    /// All other failures are contained and reported as
    /// [`IngestOutcome::Failed`].
    pub async fn ingest(&self) -> Result<IngestOutcome> {
        let batch_size = self.config.batch_size;
        let mut stats = IngestStats::default();
        let mut offset = 0;

        info!(batch_size, stage = %IngestStage::Init, "starting data ingestion");

        loop {
            stats.next_offset = offset;

            // 1. Load the next page
            let stage = IngestStage::Loading { offset };
            let documents = match self.loader.load(batch_size, offset, &self.load_options).await {
                Ok(documents) => documents,
                Err(e) => return self.abort_ingestion(stage, e, stats),
            };
            if documents.is_empty() {
                if stats.batches == 0 {
                    warn!(offset, "no documents loaded");
                }
                info!(
                    batches = stats.batches,
                    documents = stats.documents,
                    chunks = stats.chunks,
                    stage = %IngestStage::Done,
                    "data ingestion completed"
                );
                return Ok(IngestOutcome::Exhausted(stats));
            }
            stats.batches += 1;
            stats.documents += documents.len();

            // 2. Chunk every document, flattening into one list
            let stage = IngestStage::Chunking { offset };
            let mut chunks = Vec::new();
            for document in &documents {
                match self.chunker.chunk(document) {
                    Ok(document_chunks) => chunks.extend(document_chunks),
                    Err(e) => return self.abort_ingestion(stage, e, stats),
                }
            }
            if chunks.is_empty() {
                warn!(offset, document_count = documents.len(), "batch produced no chunks, skipping");
                offset += batch_size;
                continue;
            }

            // 3. Embed all chunk contents in one call, then store
            let stage = IngestStage::EmbeddingAndStoring { offset };
            let (texts, metadatas): (Vec<String>, Vec<Metadata>) =
                chunks.into_iter().map(|chunk| (chunk.content, chunk.metadata)).unzip();

            info!(offset, chunk_count = texts.len(), "embedding chunks");
            let embeddings = match self.embedder.embed_documents(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => return self.abort_ingestion(stage, e, stats),
            };
            if embeddings.len() != texts.len() {
                let e = RagError::Pipeline(format!(
                    "embedder returned {} embeddings for {} chunks",
                    embeddings.len(),
                    texts.len()
                ));
                return self.abort_ingestion(stage, e, stats);
            }

            let stored =
                self.vector_store.add(&texts, Some(metadatas.as_slice()), Some(embeddings)).await;
            if let Err(e) = stored {
                return self.abort_ingestion(stage, e, stats);
            }

            stats.chunks += texts.len();
            debug!(offset, chunk_count = texts.len(), "stored batch");
            offset += batch_size;
        }
    }

    fn abort_ingestion(
        &self,
        stage: IngestStage,
        error: RagError,
        stats: IngestStats,
    ) -> Result<IngestOutcome> {
        if error.is_precondition() {
            return Err(error);
        }
        self.error_handler.handle_error(&ErrorContext::ingestion(stage), &error);
        Ok(IngestOutcome::Failed { stage, reason: error.to_string(), stats })
    }

    /// Answer `query` from retrieved context, using the response cache.
    ///
    /// A cached answer is returned without searching or generating. On a
    /// miss the top `top_k` chunks are joined with newlines into the prompt
    /// template and sent to the generator; only successful answers are
    /// cached. Any failure is passed to the error handler and the caller
    /// receives [`QUERY_FAILURE_MESSAGE`].
    pub async fn query(&self, query: &str) -> String {
        info!(query, "generating response");
        match self.cache.get_or_compute(query, || self.answer(query)).await {
            Ok(answer) => answer,
            Err(e) => {
                self.error_handler.handle_error(&ErrorContext::query(query), &e);
                QUERY_FAILURE_MESSAGE.to_string()
            }
        }
    }

    /// Retrieve the top `top_k` chunks for `query`, joined by newlines in rank order.
    ///
    /// # Errors
    ///
    /// Propagates vector store failures.
    pub async fn retrieve_context(&self, query: &str) -> Result<String> {
        let results = self.vector_store.similarity_search(query, self.config.top_k).await?;
        debug!(result_count = results.len(), "retrieved context");
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        Ok(contents.join("\n"))
    }

    /// Fill the configured prompt template.
    pub fn build_prompt(&self, context: &str, query: &str) -> String {
        self.config.prompt_template.render(context, query)
    }

    async fn answer(&self, query: &str) -> Result<String> {
        let context = self.retrieve_context(query).await?;
        let prompt = self.build_prompt(&context, query);
        let response = self.generator.generate(&prompt).await?;
        info!(response_len = response.len(), "response generated");
        Ok(response)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// All components are required except the error handler (defaults to
/// [`LoggingErrorHandler`]) and the load options (default empty). Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the
/// pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    loader: Option<Arc<dyn DocumentLoader>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    generator: Option<Arc<dyn TextGenerator>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    load_options: LoadOptions,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedder used during ingestion.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the text generator.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the default [`LoggingErrorHandler`].
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Options passed to every loader call.
    pub fn load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        let loader =
            self.loader.ok_or_else(|| RagError::Config("loader is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::Config("chunker is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::Config("vector_store is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;

        Ok(RagPipeline {
            config,
            loader,
            chunker,
            embedder,
            vector_store,
            generator,
            error_handler: self.error_handler.unwrap_or_else(|| Arc::new(LoggingErrorHandler)),
            load_options: self.load_options,
            cache: ResponseCache::new(),
        })
    }
}
