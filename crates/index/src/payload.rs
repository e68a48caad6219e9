use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SnapshotError;

/// What a vector-index row stands for. Row `i` of the index and entry `i`
/// of the payload store describe the same evidence sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePayload {
    pub edge_id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub sentence: String,
    /// `None` when the sentence could not be matched to a chunk.
    pub chunk_id: Option<usize>,
}

pub async fn save_payloads(path: &Path, payloads: &[EvidencePayload]) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(payloads).map_err(|e| SnapshotError::corrupt(path, e))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SnapshotError::io(path, e))
}

pub async fn load_payloads(path: &Path) -> Result<Vec<EvidencePayload>, SnapshotError> {
    if !path.exists() {
        return Err(SnapshotError::MissingPayloads(path.to_path_buf()));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SnapshotError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| SnapshotError::corrupt(path, e))
}
