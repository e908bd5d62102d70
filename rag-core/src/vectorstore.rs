//! Vector store trait for storing and searching embedded texts.

use async_trait::async_trait;

use crate::document::{Metadata, SearchResult, StoredRecord};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};

/// Default number of records written per backend request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A storage backend for embedded texts with similarity search.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(embedder);
/// store.add(&texts, Some(&metadatas), Some(embeddings)).await?;
/// let results = store.similarity_search("query", 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store texts with optional metadata and optional precomputed embeddings.
    ///
    /// When `embeddings` is `None` the store embeds `texts` with its own
    /// embedder. Record ids are assigned `0..texts.len()` per call.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `metadatas` or `embeddings` do
    /// not have the same length as `texts`.
    async fn add(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        embeddings: Option<Vec<Vec<f32>>>,
    ) -> Result<()>;

    /// Return at most `k` stored texts, best match first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;
}

/// Check the length preconditions of [`VectorStore::add`].
pub fn validate_add_inputs(
    texts: &[String],
    metadatas: Option<&[Metadata]>,
    embeddings: Option<&[Vec<f32>]>,
) -> Result<()> {
    if let Some(metadatas) = metadatas {
        if metadatas.len() != texts.len() {
            return Err(RagError::InvalidInput(format!(
                "got {} metadatas for {} texts",
                metadatas.len(),
                texts.len()
            )));
        }
    }
    if let Some(embeddings) = embeddings {
        if embeddings.len() != texts.len() {
            return Err(RagError::InvalidInput(format!(
                "got {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
    }
    Ok(())
}

/// Use the given embeddings, or compute them with `embedder`.
pub(crate) async fn resolve_embeddings(
    embedder: &dyn Embedder,
    texts: &[String],
    embeddings: Option<Vec<Vec<f32>>>,
) -> Result<Vec<Vec<f32>>> {
    if let Some(embeddings) = embeddings {
        return Ok(embeddings);
    }
    let computed = embedder.embed_documents(texts).await?;
    if computed.len() != texts.len() {
        return Err(RagError::Embedding {
            provider: "embedder".to_string(),
            message: format!("returned {} embeddings for {} texts", computed.len(), texts.len()),
        });
    }
    Ok(computed)
}

/// Build records with batch-local ids `0..n` and group them into batches of
/// at most `batch_size`.
pub fn plan_batches(
    texts: &[String],
    metadatas: Option<&[Metadata]>,
    embeddings: Vec<Vec<f32>>,
    batch_size: usize,
) -> Vec<Vec<StoredRecord>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(texts.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size.min(texts.len()));

    for (i, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
        let metadata = metadatas.and_then(|m| m.get(i)).cloned().unwrap_or_default();
        current.push(StoredRecord { id: i as u64, content: text.clone(), embedding, metadata });
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
