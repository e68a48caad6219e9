use anyhow::Result;
use tiktoken_rs::{CoreBPE, Rank};

/// Deterministic token accounting used for chunk windows and context budgets.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode any contiguous run of ids produced by `encode`.
    fn decode(&self, tokens: &[u32]) -> String;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

pub const DEFAULT_ENCODING: &str = "o200k_base";

/// Byte-pair encoding compatible with the OpenAI tokenizers, so chunk sizes
/// and context budgets are measured the way the chat models count them.
pub struct BpeTokenizer {
    encoding: String,
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// `o200k_base` (gpt-4o family) or `cl100k_base` (gpt-4 / gpt-3.5).
    pub fn for_encoding(name: &str) -> Result<Self> {
        let bpe = match name {
            "o200k_base" => tiktoken_rs::o200k_base()?,
            "cl100k_base" => tiktoken_rs::cl100k_base()?,
            other => anyhow::bail!("Unknown tokenizer encoding: {}", other),
        };
        Ok(Self {
            encoding: name.to_string(),
            bpe,
        })
    }

    pub fn o200k() -> Result<Self> {
        Self::for_encoding(DEFAULT_ENCODING)
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        // special-token markup in the corpus is plain text
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|rank| rank as u32)
            .collect()
    }

    /// A window edge can fall inside a multi-byte character; the broken
    /// bytes decode as U+FFFD instead of failing the whole chunk.
    fn decode(&self, tokens: &[u32]) -> String {
        let ranks: Vec<Rank> = tokens.iter().map(|&t| t as Rank).collect();
        let bytes: Vec<u8> = self.bpe._decode_native_and_split(ranks).flatten().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
