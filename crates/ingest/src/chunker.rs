use std::ops::Range;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::tokenizer::Tokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub max_tokens: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1200,
            overlap: 100,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("max_tokens ({max_tokens}) must be greater than overlap ({overlap})")]
    OverlapTooLarge { max_tokens: usize, overlap: usize },
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.max_tokens <= self.overlap {
            return Err(ChunkError::OverlapTooLarge {
                max_tokens: self.max_tokens,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.max_tokens - self.overlap
    }
}

/// Token ranges of each window over a sequence of `total` tokens.
/// Every window starts `max_tokens - overlap` after the previous one.
pub fn window_ranges(total: usize, config: &ChunkerConfig) -> Result<Vec<Range<usize>>, ChunkError> {
    config.validate()?;

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + config.max_tokens).min(total);
        ranges.push(start..end);
        start += config.stride();
    }
    Ok(ranges)
}

pub struct Chunker {
    config: ChunkerConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Chunker {
    /// Fails before any work if the window parameters are unusable.
    pub fn new(config: ChunkerConfig, tokenizer: Arc<dyn Tokenizer>) -> Result<Self, ChunkError> {
        config.validate()?;
        Ok(Self { config, tokenizer })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        let tokens = self.tokenizer.encode(text);

        // validated in new()
        let ranges = window_ranges(tokens.len(), &self.config).unwrap_or_default();

        ranges
            .into_iter()
            .enumerate()
            .map(|(id, range)| {
                let token_count = range.len();
                Chunk::new(id, self.tokenizer.decode(&tokens[range]), token_count)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::BpeTokenizer;

    fn chunker(max_tokens: usize, overlap: usize) -> Chunker {
        Chunker::new(
            ChunkerConfig { max_tokens, overlap },
            Arc::new(BpeTokenizer::o200k().unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn rejects_overlap_not_below_max() {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(BpeTokenizer::o200k().unwrap());
        let err = Chunker::new(ChunkerConfig { max_tokens: 10, overlap: 10 }, tokenizer).err();

        assert_eq!(
            err,
            Some(ChunkError::OverlapTooLarge { max_tokens: 10, overlap: 10 })
        );
    }

    #[test]
    fn windows_advance_by_stride() {
        let config = ChunkerConfig { max_tokens: 4, overlap: 1 };
        let ranges = window_ranges(10, &config).unwrap();

        assert_eq!(ranges, vec![0..4, 3..7, 6..10, 9..10]);
    }

    #[test]
    fn windows_cover_every_token_without_gaps() {
        for (total, max_tokens, overlap) in [(0, 5, 0), (1, 5, 4), (17, 5, 2), (100, 7, 3), (64, 8, 0)] {
            let config = ChunkerConfig { max_tokens, overlap };
            let ranges = window_ranges(total, &config).unwrap();

            let mut covered = 0;
            for range in &ranges {
                assert!(range.len() <= max_tokens);
                assert!(range.start <= covered, "gap before {:?}", range);
                covered = covered.max(range.end);
            }
            assert_eq!(covered, total);
        }
    }

    #[test]
    fn non_overlapping_parts_reconstruct_text() {
        let chunker = chunker(6, 2);
        let text = "Alan Turing worked at Bletchley Park. He later joined the University of Manchester.";
        let chunks = chunker.chunk_text(text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= 6));
        assert_eq!(
            chunks.iter().map(|c| c.id).collect::<Vec<_>>(),
            (0..chunks.len()).collect::<Vec<_>>()
        );

        let tokens = chunker.tokenizer.encode(text);
        let ranges = window_ranges(tokens.len(), chunker.config()).unwrap();
        assert_eq!(ranges.len(), chunks.len());

        let mut rebuilt = String::new();
        let mut covered = 0;
        for (chunk, range) in chunks.iter().zip(&ranges) {
            assert_eq!(chunk.text, chunker.tokenizer.decode(&tokens[range.clone()]));
            let fresh = covered.max(range.start)..range.end;
            rebuilt.push_str(&chunker.tokenizer.decode(&tokens[fresh]));
            covered = range.end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunker(10, 2).chunk_text("").is_empty());
    }
}
