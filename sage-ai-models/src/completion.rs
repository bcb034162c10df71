//! Language model completion client for an Ollama-compatible API

use crate::config::CompletionConfig;
use crate::error::{ModelError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Trait for language models that can complete prompts
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the given prompt
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Name of the model answering completions
    fn model_name(&self) -> &str;
}

/// Request body for the Ollama generate API
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Non-streaming response from the Ollama generate API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible completion endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http_client: reqwest::Client,
    config: CompletionConfig,
}

impl OllamaClient {
    /// Create a new client from a completion configuration
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url())
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request_body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            "Requesting completion"
        );

        let response = self
            .http_client
            .post(self.generate_url())
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::completion(format!(
                "completion endpoint returned {status}: {error_text}"
            )));
        }

        let generated: GenerateResponse = response.json().await?;
        if generated.response.trim().is_empty() {
            return Err(ModelError::completion(
                "completion endpoint returned an empty response",
            ));
        }

        Ok(generated.response)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::new(CompletionConfig::default()).unwrap();

        assert_eq!(client.model_name(), "llama3.2");
        assert_eq!(client.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_generate_url_trailing_slash() {
        let config = CompletionConfig::new("http://localhost:11434/", "llama3.2");
        let client = OllamaClient::new(config).unwrap();

        assert_eq!(client.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            model: "llama3.2",
            prompt: "Categorize this note",
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["prompt"], "Categorize this note");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_response_parsing_ignores_extra_fields() {
        let body = r#"{
            "model": "llama3.2",
            "created_at": "2025-06-01T12:00:00Z",
            "response": "{\"category\": \"recipes\"}",
            "done": true,
            "total_duration": 1234567,
            "eval_count": 42
        }"#;

        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.response, "{\"category\": \"recipes\"}");
    }

    #[tokio::test]
    async fn test_language_model_trait_object() {
        struct FixedModel;

        #[async_trait]
        impl LanguageModel for FixedModel {
            async fn complete(&self, _prompt: &str) -> Result<String> {
                Ok("fixed".to_string())
            }

            fn model_name(&self) -> &str {
                "fixed-model"
            }
        }

        let model: Box<dyn LanguageModel> = Box::new(FixedModel);
        assert_eq!(model.complete("anything").await.unwrap(), "fixed");
        assert_eq!(model.model_name(), "fixed-model");
    }
}
