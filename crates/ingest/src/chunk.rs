use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A token-bounded window of the corpus. `id` is its position in reading
/// order and is what every downstream provenance record points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: usize,
    pub text: String,
    pub token_count: usize,
}

impl Chunk {
    pub fn new(id: usize, text: String, token_count: usize) -> Self {
        Self {
            id,
            text,
            token_count,
        }
    }
}

/// Stable fingerprint of a chunk sequence: hex SHA-256 over ids and texts.
pub fn fingerprint(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
