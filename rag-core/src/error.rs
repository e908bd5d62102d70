//! Error types for the `rag-core` crate.

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while generating text from a prompt.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The text generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while loading documents from a source.
    #[error("Loader error ({source_name}): {message}")]
    Loader {
        /// The document source that produced the error.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// A capability was called with arguments that violate its contract.
    ///
    /// These are integration bugs, never backend failures, and the pipeline
    /// does not contain them.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration validation or lookup error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential or session acquisition failed.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl RagError {
    /// Whether this error is a precondition violation rather than a runtime failure.
    pub fn is_precondition(&self) -> bool {
        matches!(self, RagError::InvalidInput(_))
    }

    /// Short, stable name of the error kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Embedding { .. } => "embedding",
            RagError::VectorStore { .. } => "vector_store",
            RagError::Generation { .. } => "generation",
            RagError::Loader { .. } => "loader",
            RagError::InvalidInput(_) => "invalid_input",
            RagError::Config(_) => "config",
            RagError::Credentials(_) => "credentials",
            RagError::Pipeline(_) => "pipeline",
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_input_is_a_precondition() {
        assert!(RagError::InvalidInput("texts/metadatas length mismatch".into()).is_precondition());
        assert!(!RagError::Config("bad".into()).is_precondition());
        assert!(
            !RagError::Generation { provider: "stub".into(), message: "down".into() }
                .is_precondition()
        );
    }

    #[test]
    fn display_includes_backend_name() {
        let err = RagError::VectorStore { backend: "pgvector".into(), message: "timeout".into() };
        assert_eq!(err.to_string(), "Vector store error (pgvector): timeout");
        assert_eq!(err.kind(), "vector_store");
    }
}
