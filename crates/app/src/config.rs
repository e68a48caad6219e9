use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use extract::PromptTemplate;
use ingest::ChunkerConfig;
use query::{RetrieverConfig, DEFAULT_ANSWER_PROMPT};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub chunking: ChunkerConfig,
    pub concurrency: ConcurrencyConfig,
    pub retrieval: RetrievalConfig,
    pub checkpoint: CheckpointConfig,
    pub paths: PathsConfig,
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// BPE encoding used for chunk and context token budgets.
    pub tokenizer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub extraction_workers: usize,
    pub embedding_workers: usize,
    pub answer_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k1: usize,
    pub top_k2: usize,
    #[serde(flatten)]
    pub retriever: RetrieverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub extraction_every: usize,
    pub answer_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Each dataset lives in `<data_root>/<dataset>/`.
    pub data_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub extraction: PromptTemplate,
    pub answer: PromptTemplate,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.0,
            request_timeout_secs: 120,
            tokenizer: ingest::DEFAULT_ENCODING.to_string(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            extraction_workers: 50,
            embedding_workers: 50,
            answer_workers: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k1: 30,
            top_k2: 5,
            retriever: RetrieverConfig::default(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            extraction_every: 10,
            answer_every: 10,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
        }
    }
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            extraction: PromptTemplate::extraction(),
            answer: PromptTemplate::new(DEFAULT_ANSWER_PROMPT),
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid with the TOML file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config: {:?}", path))?;
        toml::from_str(&contents).context(format!("Failed to parse config: {:?}", path))
    }

    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.paths.data_root.join(dataset)
    }

    /// Reject settings that cannot produce a consistent corpus snapshot.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        let workers = [
            ("extraction_workers", self.concurrency.extraction_workers),
            ("embedding_workers", self.concurrency.embedding_workers),
            ("answer_workers", self.concurrency.answer_workers),
            ("checkpoint.extraction_every", self.checkpoint.extraction_every),
            ("checkpoint.answer_every", self.checkpoint.answer_every),
            ("retrieval.top_k1", self.retrieval.top_k1),
            ("retrieval.top_k2", self.retrieval.top_k2),
        ];
        for (name, value) in workers {
            if value == 0 {
                anyhow::bail!("{} must be at least 1", name);
            }
        }

        if self.retrieval.top_k2 > self.retrieval.top_k1 {
            anyhow::bail!(
                "top_k2 ({}) must not exceed top_k1 ({})",
                self.retrieval.top_k2,
                self.retrieval.top_k1
            );
        }

        self.prompts.extraction.ensure_placeholders(&["document"])?;
        self.prompts.answer.ensure_placeholders(&["context", "question"])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.top_k1, 30);
        assert_eq!(config.retrieval.retriever.max_context_tokens, 4000);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [provider]
            kind = "ollama"
            base_url = "http://localhost:11434"

            [chunking]
            max_tokens = 500
            overlap = 50

            [retrieval]
            top_k2 = 3
            max_context_tokens = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Ollama);
        assert_eq!(config.provider.request_timeout_secs, 120);
        assert_eq!(config.provider.tokenizer, "o200k_base");
        assert_eq!(config.chunking.max_tokens, 500);
        assert_eq!(config.retrieval.top_k1, 30);
        assert_eq!(config.retrieval.top_k2, 3);
        assert_eq!(config.retrieval.retriever.max_context_tokens, 1500);
        assert_eq!(config.retrieval.retriever.extra_witnesses, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = AppConfig::default();
        config.chunking.overlap = config.chunking.max_tokens;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.concurrency.answer_workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retrieval.top_k2 = 31;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.prompts.answer = PromptTemplate::new("no slots");
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_without_file_is_default() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.dataset_dir("hotpotQA"), PathBuf::from("data/hotpotQA"));
    }
}
