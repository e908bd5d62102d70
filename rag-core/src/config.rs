//! Configuration for the RAG pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RagError, Result};
use crate::prompt::PromptTemplate;
use crate::settings::ConfigProvider;

/// Sizes for the two chunking passes, in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target block size of the structural (markdown) pass.
    pub markdown_chunk_size: usize,
    /// Overlap between structural blocks.
    pub markdown_chunk_overlap: usize,
    /// Window size of the fixed-width pass.
    pub recursive_chunk_size: usize,
    /// Characters shared by consecutive fixed-width chunks.
    pub recursive_chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            markdown_chunk_size: 1000,
            markdown_chunk_overlap: 0,
            recursive_chunk_size: 200,
            recursive_chunk_overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a size is zero or an overlap is not
    /// smaller than its size.
    pub fn validate(&self) -> Result<()> {
        let passes = [
            ("markdown", self.markdown_chunk_size, self.markdown_chunk_overlap),
            ("recursive", self.recursive_chunk_size, self.recursive_chunk_overlap),
        ];
        for (name, size, overlap) in passes {
            if size == 0 {
                return Err(RagError::Config(format!("{name}_chunk_size must be greater than zero")));
            }
            if overlap >= size {
                return Err(RagError::Config(format!(
                    "{name}_chunk_overlap ({overlap}) must be less than {name}_chunk_size ({size})"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of documents requested from the loader per ingestion batch.
    pub batch_size: usize,
    /// Number of chunks retrieved as context for a query.
    pub top_k: usize,
    /// Template filled with the retrieved context and the query.
    pub prompt_template: PromptTemplate,
    /// Chunking pass sizes.
    pub chunking: ChunkingConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            top_k: 4,
            prompt_template: PromptTemplate::default(),
            chunking: ChunkingConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Read pipeline settings from a configuration provider.
    ///
    /// Recognised keys: `batch_size`, `top_k`, `prompt_template` and the
    /// `chunking` section. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a value has the wrong shape or the
    /// resulting configuration is invalid.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(batch_size) = as_usize(&provider.get("batch_size", Value::Null), "batch_size")? {
            builder = builder.batch_size(batch_size);
        }
        if let Some(top_k) = as_usize(&provider.get("top_k", Value::Null), "top_k")? {
            builder = builder.top_k(top_k);
        }
        match provider.get("prompt_template", Value::Null) {
            Value::Null => {}
            Value::String(template) => builder = builder.prompt_template(template),
            other => {
                return Err(RagError::Config(format!(
                    "prompt_template must be a string, got {other}"
                )));
            }
        }
        let chunking = provider.get("chunking", Value::Null);
        if !chunking.is_null() {
            let chunking: ChunkingConfig = serde_json::from_value(chunking)
                .map_err(|e| RagError::Config(format!("invalid chunking section: {e}")))?;
            builder = builder.chunking(chunking);
        }

        builder.build()
    }
}

fn as_usize(value: &Value, key: &str) -> Result<Option<usize>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| RagError::Config(format!("{key} must be a non-negative integer"))),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RagError::Config(format!("{key} must be a non-negative integer, got '{s}'"))),
        other => Err(RagError::Config(format!("{key} must be a non-negative integer, got {other}"))),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
    prompt_template: Option<String>,
}

impl RagConfigBuilder {
    /// Set the loader page size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Override the prompt template. Parsed in [`build`](Self::build).
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Set both chunking passes at once.
    pub fn chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.config.chunking = chunking;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `batch_size == 0` or `top_k == 0`
    /// - a chunk overlap is not smaller than its chunk size
    /// - the prompt template does not parse
    pub fn build(mut self) -> Result<RagConfig> {
        if self.config.batch_size == 0 {
            return Err(RagError::Config("batch_size must be greater than zero".to_string()));
        }
        if self.config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        self.config.chunking.validate()?;
        if let Some(template) = self.prompt_template {
            self.config.prompt_template = PromptTemplate::parse(template)?;
        }
        Ok(self.config)
    }
}
