use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use extract::{LanguageModel, OllamaClient, OpenAiClient};
use index::{Embedder, EmbeddingClient, OpenAiEmbeddingClient};
use ingest::{BpeTokenizer, Tokenizer};

use crate::config::{ProviderConfig, ProviderKind};

/// External capabilities shared by every stage of a run.
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub tokenizer: Arc<dyn Tokenizer>,
}

/// Build clients for the configured provider. The OpenAI-compatible
/// provider needs `OPENAI_API_KEY`.
pub fn connect(config: &ProviderConfig) -> Result<Services> {
    connect_with_key(config, std::env::var("OPENAI_API_KEY").ok())
}

pub fn connect_with_key(config: &ProviderConfig, api_key: Option<String>) -> Result<Services> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let (llm, embedder): (Arc<dyn LanguageModel>, Arc<dyn Embedder>) = match config.kind {
        ProviderKind::OpenAi => {
            let key = api_key
                .filter(|k| !k.trim().is_empty())
                .context("OPENAI_API_KEY must be set to use the openai provider")?;
            (
                Arc::new(OpenAiClient::new(
                    config.base_url.clone(),
                    key.clone(),
                    config.chat_model.clone(),
                    timeout,
                )?),
                Arc::new(OpenAiEmbeddingClient::new(
                    config.base_url.clone(),
                    key,
                    config.embedding_model.clone(),
                    timeout,
                )?),
            )
        }
        ProviderKind::Ollama => (
            Arc::new(OllamaClient::with_timeout(
                config.base_url.clone(),
                config.chat_model.clone(),
                timeout,
            )?),
            Arc::new(EmbeddingClient::with_timeout(
                config.base_url.clone(),
                config.embedding_model.clone(),
                timeout,
            )?),
        ),
    };

    let tokenizer = BpeTokenizer::for_encoding(&config.tokenizer)
        .context(format!("Failed to load tokenizer {:?}", config.tokenizer))?;

    tracing::info!(
        provider = ?config.kind,
        chat_model = %config.chat_model,
        embedding_model = %config.embedding_model,
        tokenizer = %config.tokenizer,
        "Connected providers"
    );

    Ok(Services {
        llm,
        embedder,
        tokenizer: Arc::new(tokenizer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_without_key_is_fatal() {
        let config = ProviderConfig::default();
        assert!(connect_with_key(&config, None).is_err());
        assert!(connect_with_key(&config, Some("  ".into())).is_err());
        assert!(connect_with_key(&config, Some("sk-test".into())).is_ok());
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = ProviderConfig {
            kind: ProviderKind::Ollama,
            base_url: "http://localhost:11434".into(),
            ..ProviderConfig::default()
        };
        assert!(connect_with_key(&config, None).is_ok());
    }

    #[test]
    fn unknown_tokenizer_is_fatal() {
        let config = ProviderConfig {
            tokenizer: "r50k_typo".into(),
            ..ProviderConfig::default()
        };
        assert!(connect_with_key(&config, Some("sk-test".into())).is_err());
    }
}
