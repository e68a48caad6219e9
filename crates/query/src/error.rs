use index::SnapshotError;
use thiserror::Error;

/// Why an `answer` call failed. The retriever never retries; the caller
/// decides what a failure means.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Failed to embed query: {0:#}")]
    Embedding(anyhow::Error),

    #[error("Vector index is empty")]
    EmptyIndex,

    #[error("Vector index rejected the query: {0}")]
    Index(#[from] SnapshotError),

    #[error("Answer generation failed: {0:#}")]
    Generation(anyhow::Error),
}
