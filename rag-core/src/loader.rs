//! Document loader trait for paginated document sources.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::document::Document;
use crate::error::Result;

/// Source-specific options passed through to every [`DocumentLoader::load`] call.
pub type LoadOptions = HashMap<String, Value>;

/// A paginated source of [`Document`]s.
///
/// A call returns at most `limit` documents starting at `offset`. An empty
/// vector means the source is exhausted; it is never an error. Implementations
/// may swallow per-page failures and return partial or empty results, or
/// propagate them as errors.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{DocumentLoader, LoadOptions};
///
/// let page = loader.load(100, 0, &LoadOptions::new()).await?;
/// if page.is_empty() {
///     // no more documents
/// }
/// ```
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load one page of documents.
    async fn load(&self, limit: usize, offset: usize, extra: &LoadOptions) -> Result<Vec<Document>>;
}
