//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], an append-only vector store
//! backed by a `Vec` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small-scale use cases.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Metadata, SearchResult, StoredRecord};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::vectorstore::{
    DEFAULT_BATCH_SIZE, VectorStore, plan_batches, resolve_embeddings, validate_add_inputs,
};

/// An in-memory vector store ranking by cosine distance (lower is closer).
///
/// Records are appended in batches; ids restart at zero on every `add`, so
/// ids identify a record only within the call that stored it.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(Arc::new(embedder));
/// store.add(&texts, None, None).await?;
/// ```
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store bound to `embedder`.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, batch_size: DEFAULT_BATCH_SIZE, records: RwLock::new(Vec::new()) }
    }

    /// Set the number of records appended per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Snapshot of every stored record, in insertion order.
    pub async fn records(&self) -> Vec<StoredRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Compute the cosine distance `1 - cos(a, b)` between two vectors.
///
/// Returns 1.0 if either vector has zero magnitude.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        embeddings: Option<Vec<Vec<f32>>>,
    ) -> Result<()> {
        validate_add_inputs(texts, metadatas, embeddings.as_deref())?;
        if texts.is_empty() {
            return Ok(());
        }

        let embeddings = resolve_embeddings(self.embedder.as_ref(), texts, embeddings).await?;
        for batch in plan_batches(texts, metadatas, embeddings, self.batch_size) {
            let count = batch.len();
            self.records.write().await.extend(batch);
            debug!(backend = "InMemory", count, "appended batch");
        }
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let records = self.records.read().await;

        let mut scored: Vec<SearchResult> = records
            .iter()
            .map(|record| {
                SearchResult::new(
                    record.content.clone(),
                    cosine_distance(&record.embedding, &query_embedding),
                )
            })
            .collect();

        scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
