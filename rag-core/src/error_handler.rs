//! Centralized handling of failures contained by the pipeline.

use std::fmt;

use tracing::error;

use crate::error::RagError;

/// The pipeline operation during which an error was contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ingestion,
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Ingestion => f.write_str("ingestion"),
            Operation::Query => f.write_str("query"),
        }
    }
}

/// States of the ingestion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Init,
    Loading { offset: usize },
    Chunking { offset: usize },
    EmbeddingAndStoring { offset: usize },
    Done,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStage::Init => f.write_str("init"),
            IngestStage::Loading { offset } => write!(f, "loading(offset={offset})"),
            IngestStage::Chunking { offset } => write!(f, "chunking(offset={offset})"),
            IngestStage::EmbeddingAndStoring { offset } => {
                write!(f, "embedding_and_storing(offset={offset})")
            }
            IngestStage::Done => f.write_str("done"),
        }
    }
}

/// Where a contained error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub operation: Operation,
    pub stage: Option<IngestStage>,
    pub detail: Option<String>,
}

impl ErrorContext {
    pub fn ingestion(stage: IngestStage) -> Self {
        Self { operation: Operation::Ingestion, stage: Some(stage), detail: None }
    }

    pub fn query(query: impl Into<String>) -> Self {
        Self { operation: Operation::Query, stage: None, detail: Some(query.into()) }
    }
}

/// Receives every error the pipeline contains, exactly once per failure.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, context: &ErrorContext, error: &RagError);
}

/// Default handler: one structured `error` event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, context: &ErrorContext, error: &RagError) {
        error!(
            operation = %context.operation,
            stage = ?context.stage,
            detail = ?context.detail,
            error.kind = error.kind(),
            error = %error,
            "an error occurred"
        );
    }
}
