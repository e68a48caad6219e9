use std::path::PathBuf;
use thiserror::Error;

/// Problems with a persisted corpus snapshot. Every variant means retrieval
/// cannot trust row-to-payload provenance and must not start.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Vector index not found: {0:?}")]
    MissingIndex(PathBuf),

    #[error("Payload store not found: {0:?}")]
    MissingPayloads(PathBuf),

    #[error("Graph not found: {0:?}")]
    MissingGraph(PathBuf),

    #[error("Vector index has {rows} rows but the payload store has {payloads} entries")]
    RowCountMismatch { rows: usize, payloads: usize },

    #[error("Vector dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt snapshot file {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SnapshotError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
