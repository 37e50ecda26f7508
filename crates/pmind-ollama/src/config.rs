//! Ollama configuration

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use pmind_core::{Error, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_LLM_MODEL: &str = "phi4-mini";

/// Configuration for the Ollama client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub llm_model: String,
    /// Known embedding dimensionality; probed from the server when unset
    pub embedding_dimensions: Option<usize>,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            embedding_dimensions: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl OllamaConfig {
    /// Create configuration from environment variables, after loading `.env`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from any key/value source shaped like the
    /// environment (`OLLAMA_URL`, `EMBEDDING_MODEL`, `LLM_MODEL`,
    /// `EMBEDDING_DIMENSIONS`)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let embedding_dimensions = match lookup("EMBEDDING_DIMENSIONS") {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| {
                Error::InvalidConfiguration(format!(
                    "EMBEDDING_DIMENSIONS must be a positive integer, got '{}'",
                    raw
                ))
            })?),
            None => None,
        };

        Ok(Self {
            base_url: lookup("OLLAMA_URL").unwrap_or(defaults.base_url),
            embedding_model: lookup("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            llm_model: lookup("LLM_MODEL").unwrap_or(defaults.llm_model),
            embedding_dimensions,
            request_timeout: defaults.request_timeout,
        })
    }

    /// Create configuration with explicit values
    pub fn new(base_url: impl Into<String>, embedding_model: impl Into<String>, llm_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            embedding_model: embedding_model.into(),
            llm_model: llm_model.into(),
            ..Default::default()
        }
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = Some(dimensions);
        self
    }

    /// Join an API path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
