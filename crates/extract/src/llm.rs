use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Text,
    Structured,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn text(prompt: String, temperature: f32) -> Self {
        Self {
            prompt,
            system: None,
            temperature,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn structured(prompt: String, temperature: f32) -> Self {
        Self {
            prompt,
            system: None,
            temperature,
            response_format: ResponseFormat::Structured,
        }
    }

    pub fn with_system(mut self, system: &str) -> Self {
        self.system = Some(system.to_string());
        self
    }
}

/// A text-completion capability. Implementations never retry; a failed call
/// is reported to the caller as-is.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>, // "json" for structured output
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url,
            model,
            client,
        })
    }

    pub async fn generate(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            stream: false,
            system: request.system.clone(),
            format: match request.response_format {
                ResponseFormat::Structured => Some("json".to_string()),
                ResponseFormat::Text => None,
            },
            options: OllamaOptions {
                temperature: request.temperature,
            },
        };

        let response = self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama request failed: {} {}", status, text);
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.generate(&request).await
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiClient {
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }

    pub async fn chat(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            response_format: match request.response_format {
                ResponseFormat::Structured => Some(serde_json::json!({ "type": "json_object" })),
                ResponseFormat::Text => None,
            },
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion failed: {} {}", status, text);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .context("Chat completion returned no choices")
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.chat(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn ollama_requests_json_format_for_structured_calls() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/generate").is_true(|req| {
                let body = String::from_utf8_lossy(req.body().as_ref());
                body.contains(r#""format":"json""#) && body.contains(r#""model":"llama3""#)
            });
            then.status(200).json_body(json!({ "response": "[]" }));
        });

        let client = OllamaClient::new(server.base_url(), "llama3".to_string());
        let out = client
            .complete(CompletionRequest::structured("extract".to_string(), 0.0))
            .await
            .unwrap();

        assert_eq!(out, "[]");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn ollama_reports_http_failure() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(500).body("boom");
        });

        let client = OllamaClient::new(server.base_url(), "llama3".to_string());
        let err = client
            .complete(CompletionRequest::text("hi".to_string(), 0.0))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn openai_sends_system_message_and_returns_content() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer sk-test")
                .is_true(|req| {
                    let body = String::from_utf8_lossy(req.body().as_ref());
                    body.contains(r#""response_format":{"type":"json_object"}"#)
                        && body.contains(r#""role":"system""#)
                });
            then.status(200).json_body(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": " {\"ok\": true} " } }
                ]
            }));
        });

        let client = OpenAiClient::new(
            server.base_url(),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let out = client
            .complete(
                CompletionRequest::structured("extract".to_string(), 0.0)
                    .with_system("You are an expert in information extraction."),
            )
            .await
            .unwrap();

        assert_eq!(out, "{\"ok\": true}");
        mock.assert_calls(1);
    }
}
