use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::chunk::{fingerprint, Chunk};
use crate::chunker::ChunkerConfig;

/// Persisted chunk list for one corpus snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub fingerprint: String,
    pub max_tokens: usize,
    pub overlap: usize,
    pub chunks: Vec<Chunk>,
}

impl ChunkManifest {
    pub fn new(config: &ChunkerConfig, chunks: Vec<Chunk>) -> Self {
        Self {
            fingerprint: fingerprint(&chunks),
            max_tokens: config.max_tokens,
            overlap: config.overlap,
            chunks,
        }
    }

    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .await
            .context(format!("Failed to read chunk manifest: {:?}", path))?;
        let manifest = serde_json::from_str(&content)
            .context(format!("Failed to parse chunk manifest: {:?}", path))?;
        Ok(Some(manifest))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .await
            .context(format!("Failed to write chunk manifest: {:?}", path))?;
        Ok(())
    }

    /// One chunk per line, newlines flattened to spaces.
    pub async fn save_lines(&self, path: &Path) -> Result<()> {
        let mut out = String::new();
        for chunk in &self.chunks {
            out.push_str(chunk.text.replace('\n', " ").trim());
            out.push('\n');
        }
        fs::write(path, out)
            .await
            .context(format!("Failed to write chunk lines: {:?}", path))?;
        Ok(())
    }

    /// Chunk ids of an existing snapshot must never be renumbered.
    pub fn ensure_same_corpus(&self, fresh: &ChunkManifest) -> Result<()> {
        if self.fingerprint != fresh.fingerprint {
            anyhow::bail!(
                "Corpus changed since the last run ({} chunks at max_tokens={} overlap={}, now {} chunks at max_tokens={} overlap={}); \
                 remove the dataset directory to start a new snapshot",
                self.chunks.len(),
                self.max_tokens,
                self.overlap,
                fresh.chunks.len(),
                fresh.max_tokens,
                fresh.overlap,
            );
        }
        Ok(())
    }
}
