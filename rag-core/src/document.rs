//! Data types for documents, chunks, stored records, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form key-value metadata attached to documents and chunks.
pub type Metadata = HashMap<String, Value>;

/// A source document produced by a [`DocumentLoader`](crate::DocumentLoader).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The text content of the document. Must be non-empty.
    pub content: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document from its content and metadata.
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self { content: content.into(), metadata }
    }
}

/// A retrievable segment of a [`Document`].
///
/// The metadata is always an exact copy of the parent document's metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub content: String,
    /// Metadata copied verbatim from the parent document.
    pub metadata: Metadata,
}

/// A record persisted by a vector store.
///
/// `id` is local to the `add` call that produced the record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: u64,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// A retrieved text paired with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The stored chunk content.
    pub content: String,
    /// Cosine distance to the query (lower is closer).
    pub score: f32,
}

impl SearchResult {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self { content: content.into(), score }
    }
}
