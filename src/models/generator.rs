//! Text generation collaborator: prompt in, answer text out.

use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Sampling settings passed through to the generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub do_sample: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            do_sample: true,
        }
    }
}

/// Generation contract. May be non-deterministic when sampling is on.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        sampling: &SamplingParams,
    ) -> Result<String>;
}

/// Generator backed by the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    /// Create from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| Error::ConfigError("OPENAI_API_KEY not set".to_string()))?;
        Self::new(api_key, model)
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("OPENAI_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("docrag/0.1.0")
            .build()
            .map_err(|e| Error::GenerationError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        sampling: &SamplingParams,
    ) -> Result<String> {
        let temperature = if sampling.do_sample {
            sampling.temperature
        } else {
            0.0
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature,
            max_tokens: max_new_tokens as u32,
        };

        debug!(
            "Generating up to {} tokens (temperature {})",
            max_new_tokens, temperature
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::GenerationError(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::GenerationError(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::GenerationError(format!(
                "OpenAI error {}: {}",
                status, text
            )));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::GenerationError(format!("invalid response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|answer| answer.trim().to_string())
            .ok_or_else(|| Error::GenerationError("empty response from OpenAI".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
