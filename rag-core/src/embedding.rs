//! Embedder trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. There is no retry logic at this layer: backend failures are
/// returned to the caller as [`RagError::Embedding`](crate::RagError::Embedding).
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::Embedder;
///
/// let vectors = embedder.embed_documents(&texts).await?;
/// assert_eq!(vectors.len(), texts.len());
/// let query = embedder.embed_query("hello world").await?;
/// assert_eq!(query.len(), embedder.dimensions());
/// ```
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. The output is 1:1 with, and in the order of, the input.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;
}
