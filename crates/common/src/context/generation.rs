//! Generation service abstraction
//!
//! One prompt in, one text reply out. The pipeline treats every failure here
//! as recoverable, so implementations only need to report errors honestly.

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Sampling parameters sent with each request
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Trait for text generation
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Anthropic messages API client
pub struct AnthropicClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationClient for AnthropicClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                message: format!("API error {}: {}", status, body),
            });
        }

        let reply: MessagesResponse = response.json().await.map_err(|e| AppError::Generation {
            message: format!("Failed to parse response: {}", e),
        })?;

        reply
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| AppError::Generation {
                message: "Empty response".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Canned replies for development and tests
pub struct MockGenerationClient {
    reply: Result<String>,
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self::with_reply(
            "1. [CONTINUATION]: Introduce the next point with a concrete example.\n\
             2. [IMPROVEMENT]: Tighten the opening sentence so the claim comes first.\n\
             3. [STRUCTURE]: Group related ideas into their own paragraph.",
        )
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
        }
    }

    /// A client whose every call fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(AppError::Generation {
                message: message.into(),
            }),
        }
    }
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(e) => Err(AppError::Generation {
                message: e.to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "mock-generation"
    }
}

/// Create a generation client based on configuration
pub fn create_generation_client(config: &GenerationConfig) -> Result<Arc<dyn GenerationClient>> {
    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => Ok(Arc::new(AnthropicClient::new(config, key.to_string())?)),
        None => {
            tracing::warn!("Generation API key not set, using mock client");
            Ok(Arc::new(MockGenerationClient::new()))
        }
    }
}
