use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of the provenance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProvenanceRecord {
    Chunk { query: String, chunk_id: usize },
    Sentence { query: String, sentence_chunk_id: usize },
}

/// Append-only NDJSON log of which chunks fed which query. All lines for a
/// query are written and flushed in one critical section.
pub struct ProvenanceLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ProvenanceLog {
    /// Start a fresh log, replacing any file at `path`.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .context(format!("Failed to create provenance log: {:?}", path))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(
        &self,
        query: &str,
        chunk_ids: &BTreeSet<usize>,
        sentence_chunk_ids: &BTreeSet<usize>,
    ) -> Result<()> {
        let mut buf = String::new();
        let records = chunk_ids
            .iter()
            .map(|&chunk_id| ProvenanceRecord::Chunk {
                query: query.to_string(),
                chunk_id,
            })
            .chain(sentence_chunk_ids.iter().map(|&sentence_chunk_id| ProvenanceRecord::Sentence {
                query: query.to_string(),
                sentence_chunk_id,
            }));
        for record in records {
            buf.push_str(&serde_json::to_string(&record)?);
            buf.push('\n');
        }
        if buf.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock().await;
        file.write_all(buf.as_bytes())
            .await
            .context(format!("Failed to append to provenance log: {:?}", self.path))?;
        file.flush().await?;
        Ok(())
    }
}

pub async fn read_log(path: &Path) -> Result<Vec<ProvenanceRecord>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed to read provenance log: {:?}", path))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("Malformed provenance line"))
        .collect()
}
