pub mod chunk;
pub mod chunker;
pub mod manifest;
pub mod reader;
pub mod tokenizer;

pub use chunk::Chunk;
pub use chunker::{ChunkError, Chunker, ChunkerConfig};
pub use manifest::ChunkManifest;
pub use reader::FileReader;
pub use tokenizer::{BpeTokenizer, Tokenizer, DEFAULT_ENCODING};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Read the corpus, cut it into windows and persist the manifest.
/// An existing manifest for a different corpus stops the run.
pub async fn prepare_chunks(
    input: &Path,
    config: ChunkerConfig,
    tokenizer: Arc<dyn Tokenizer>,
    manifest_path: &Path,
) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(config, tokenizer)?;
    let content = FileReader::read_corpus(input).await?;
    let fresh = ChunkManifest::new(&config, chunker.chunk_text(&content));

    if let Some(existing) = ChunkManifest::load(manifest_path).await? {
        existing.ensure_same_corpus(&fresh)?;
    }

    fresh.save(manifest_path).await?;
    fresh.save_lines(&manifest_path.with_extension("txt")).await?;

    tracing::info!(
        chunks = fresh.chunks.len(),
        max_tokens = config.max_tokens,
        overlap = config.overlap,
        "Chunked corpus"
    );

    Ok(fresh.chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_is_repeatable_and_guards_renumbering() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corpus.txt");
        let manifest = dir.path().join("chunks.json");
        std::fs::write(&input, "Ada Lovelace wrote the first program for the Analytical Engine.").unwrap();
        let config = ChunkerConfig { max_tokens: 8, overlap: 2 };

        let first = prepare_chunks(&input, config, Arc::new(BpeTokenizer::o200k().unwrap()), &manifest)
            .await
            .unwrap();
        let second = prepare_chunks(&input, config, Arc::new(BpeTokenizer::o200k().unwrap()), &manifest)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(dir.path().join("chunks.txt").exists());

        std::fs::write(&input, "A different corpus entirely.").unwrap();
        let err = prepare_chunks(&input, config, Arc::new(BpeTokenizer::o200k().unwrap()), &manifest).await;
        assert!(err.is_err());
    }
}
