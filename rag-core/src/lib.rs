//! # rag-core
//!
//! Retrieval-Augmented Generation pipeline: pages documents out of a source,
//! splits them into chunks, embeds and stores them, and answers questions
//! from the retrieved chunks with a cached language-model call.
//!
//! ## Components
//!
//! - [`DocumentLoader`], [`Chunker`], [`Embedder`], [`VectorStore`],
//!   [`TextGenerator`]: capability traits the pipeline is assembled from
//! - [`TwoStageChunker`]: markdown-structural split followed by a fixed-width
//!   overlapping split
//! - [`InMemoryVectorStore`]: brute-force cosine store for tests and development
//! - [`ResponseCache`]: SHA-256 keyed memo of generated answers
//! - [`RagPipeline`]: batched ingestion and cached query answering
//! - [`FileConfig`] / [`EnvCredentialProvider`]: YAML + environment configuration
//!
//! ## Features
//!
//! - `openai`: OpenAI-compatible embedder and generator
//! - `confluence`: Confluence space loader
//! - `pgvector`: PostgreSQL + pgvector store
//! - `full`: all of the above
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rag_core::{RagConfig, RagPipeline, InMemoryVectorStore, TwoStageChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .loader(loader)
//!     .chunker(Arc::new(TwoStageChunker::default()))
//!     .embedder(embedder.clone())
//!     .vector_store(Arc::new(InMemoryVectorStore::new(embedder)))
//!     .generator(generator)
//!     .build()?;
//!
//! pipeline.ingest().await?;
//! println!("{}", pipeline.query("What is X?").await);
//! ```

pub mod cache;
pub mod chunking;
pub mod config;
pub mod credentials;
pub mod document;
pub mod embedding;
pub mod error;
pub mod error_handler;
pub mod generation;
pub mod inmemory;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod settings;
pub mod vectorstore;

#[cfg(feature = "confluence")]
pub mod confluence;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use cache::{ResponseCache, cache_key};
pub use chunking::{Chunker, FixedWidthSplitter, MarkdownSplitter, TextSplitter, TwoStageChunker};
pub use config::{ChunkingConfig, RagConfig, RagConfigBuilder};
pub use credentials::{ClientHandle, CredentialProvider, EnvCredentialProvider, Session};
pub use document::{Chunk, Document, Metadata, SearchResult, StoredRecord};
pub use embedding::Embedder;
pub use error::{RagError, Result};
pub use error_handler::{ErrorContext, ErrorHandler, IngestStage, LoggingErrorHandler, Operation};
pub use generation::TextGenerator;
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentLoader, LoadOptions};
pub use pipeline::{IngestOutcome, IngestStats, QUERY_FAILURE_MESSAGE, RagPipeline, RagPipelineBuilder};
pub use prompt::{DEFAULT_PROMPT_TEMPLATE, PromptTemplate};
pub use settings::{
    ConfigProvider, DatabaseConfig, DocumentSourceConfig, EmbeddingsConfig, FileConfig, LlmConfig,
};
pub use vectorstore::{DEFAULT_BATCH_SIZE, VectorStore};
