//! Ollama HTTP client implementation

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::debug;

use pmind_core::{
    EmbeddingProvider, Error, GenerationConfig, GenerationResult, Generator, Result,
};

use crate::config::OllamaConfig;

/// Shared HTTP plumbing for the Ollama endpoints
#[derive(Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmbedRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub message: ChatResponseMessage,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create a new Ollama client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env()?)
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Embedding provider for the configured embedding model
    pub fn embeddings(&self) -> OllamaEmbedder {
        let dimensions = OnceCell::new_with(self.config.embedding_dimensions);
        OllamaEmbedder {
            client: self.clone(),
            model: self.config.embedding_model.clone(),
            dimensions,
        }
    }

    /// Generator for the configured chat model
    pub fn chat(&self) -> OllamaGenerator {
        OllamaGenerator {
            client: self.clone(),
            generation: GenerationConfig {
                model_id: self.config.llm_model.clone(),
                timeout: self.config.request_timeout,
                ..Default::default()
            },
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = self.config.endpoint(path);
        debug!(url = %url, "posting to ollama");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, &error_text));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| Error::permanent(format!("malformed response from {}: {}", url, e)))
    }
}

/// Map a transport-level failure onto the provider error taxonomy
fn classify_request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::transient(err.to_string())
    } else {
        Error::permanent(err.to_string())
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy
pub(crate) fn classify_status(status: StatusCode, body: &str) -> Error {
    let message = format!("Ollama request failed with status {}: {}", status, body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Error::transient(message)
    } else {
        Error::permanent(message)
    }
}

/// Ollama-backed [`EmbeddingProvider`]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimensions: OnceCell<usize>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response: EmbedResponse = self.client.post_json("api/embed", &request).await?;
        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::permanent(format!("model '{}' returned no embedding", self.model)))
    }

    async fn dimensions(&self) -> Result<usize> {
        self.dimensions
            .get_or_try_init(|| async {
                let probe = self.embed("dimension probe").await?;
                debug!(model = %self.model, dimensions = probe.len(), "probed embedding dimensions");
                Ok(probe.len())
            })
            .await
            .copied()
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Ollama-backed [`Generator`] using the chat endpoint
pub struct OllamaGenerator {
    client: OllamaClient,
    generation: GenerationConfig,
}

impl OllamaGenerator {
    /// Override generation parameters
    pub fn with_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub(crate) fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.generation.model_id,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions {
                temperature: self.generation.temperature,
                num_predict: self.generation.max_tokens,
            },
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        let request = self.request(prompt);
        let call = self.client.post_json::<_, ChatResponse>("api/chat", &request);

        let response = match timeout(self.generation.timeout, call).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::transient("generation request timed out")),
        };

        Ok(GenerationResult {
            text: response.message.content,
            model_id: self.generation.model_id.clone(),
            tokens_used: response.eval_count,
        })
    }

    fn model_id(&self) -> &str {
        &self.generation.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "busy").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND, "model not found").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad").is_transient());
    }

    #[tokio::test]
    async fn test_configured_dimensions_skip_probe() {
        let config = OllamaConfig::new("http://127.0.0.1:9", "nomic-embed-text", "phi4-mini")
            .with_embedding_dimensions(768);
        let embedder = OllamaClient::new(config).unwrap().embeddings();

        assert_eq!(embedder.dimensions().await.unwrap(), 768);
        assert_eq!(embedder.model_id(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let config = OllamaConfig::new("http://127.0.0.1:9", "nomic-embed-text", "phi4-mini");
        let embedder = OllamaClient::new(config).unwrap().embeddings();

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
