//! Runtime settings: defaults, `.env`, environment, then flags

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use pmind_core::{ChunkingConfig, EmbeddingProvider, Error, Result, RetryConfig};
use pmind_ollama::{OllamaClient, OllamaConfig};
use pmind_rag::{DEFAULT_INDEX_PATH, HashEmbedder, RagConfig, RagPipeline};

/// Embedding model name that selects the built-in hash embedder
pub const HASH_EMBEDDING_MODEL: &str = "hash";

/// Command-line overrides; every flag wins over its environment variable
#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// Embedding model served by Ollama ("hash" for offline hashing)
    #[arg(long, global = true)]
    pub embedding_model: Option<String>,

    /// Chat model used to answer
    #[arg(long, global = true)]
    pub llm_model: Option<String>,

    /// Base URL of the Ollama server
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// Chunk size in characters
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long, global = true)]
    pub overlap: Option<usize>,

    /// Embedding dimensionality (probed from the model when unset)
    #[arg(long, global = true)]
    pub embedding_dimensions: Option<usize>,

    /// Directory of the persisted index
    #[arg(long, global = true)]
    pub index_path: Option<PathBuf>,

    /// Chunks retrieved per question
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Minimum cosine similarity for a chunk to be used
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub min_relevance: Option<f32>,

    /// Embedding requests in flight while indexing
    #[arg(long, global = true)]
    pub embed_concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub embedding_model: String,
    pub llm_model: String,
    pub ollama_url: String,
    pub chunk_size: usize,
    pub overlap: usize,
    pub embedding_dimensions: Option<usize>,
    pub index_path: PathBuf,
    pub top_k: usize,
    pub min_relevance: f32,
    pub embed_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let ollama = OllamaConfig::default();
        let rag = RagConfig::default();
        Self {
            embedding_model: ollama.embedding_model,
            llm_model: ollama.llm_model,
            ollama_url: ollama.base_url,
            chunk_size: rag.chunking.chunk_size,
            overlap: rag.chunking.overlap,
            embedding_dimensions: ollama.embedding_dimensions,
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            top_k: rag.top_k,
            min_relevance: rag.min_relevance,
            embed_concurrency: rag.embed_concurrency,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::InvalidConfiguration(format!("{} has an invalid value '{}'", key, raw))
        }),
        None => Ok(None),
    }
}

impl Settings {
    /// Settings from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Settings from an environment-shaped key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ollama = OllamaConfig::from_lookup(&lookup)?;
        let defaults = Self::default();

        Ok(Self {
            embedding_model: ollama.embedding_model,
            llm_model: ollama.llm_model,
            ollama_url: ollama.base_url,
            chunk_size: parse_var(&lookup, "CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            overlap: parse_var(&lookup, "OVERLAP")?.unwrap_or(defaults.overlap),
            embedding_dimensions: ollama.embedding_dimensions,
            index_path: lookup("INDEX_PATH").map(PathBuf::from).unwrap_or(defaults.index_path),
            top_k: parse_var(&lookup, "TOP_K")?.unwrap_or(defaults.top_k),
            min_relevance: parse_var(&lookup, "MIN_RELEVANCE")?.unwrap_or(defaults.min_relevance),
            embed_concurrency: parse_var(&lookup, "EMBED_CONCURRENCY")?
                .unwrap_or(defaults.embed_concurrency),
        })
    }

    /// Environment first, then flags on top
    pub fn resolve(args: &SettingsArgs) -> Result<Self> {
        Ok(Self::from_env()?.with_overrides(args))
    }

    pub fn with_overrides(mut self, args: &SettingsArgs) -> Self {
        if let Some(v) = &args.embedding_model {
            self.embedding_model = v.clone();
        }
        if let Some(v) = &args.llm_model {
            self.llm_model = v.clone();
        }
        if let Some(v) = &args.ollama_url {
            self.ollama_url = v.clone();
        }
        if let Some(v) = args.chunk_size {
            self.chunk_size = v;
        }
        if let Some(v) = args.overlap {
            self.overlap = v;
        }
        if let Some(v) = args.embedding_dimensions {
            self.embedding_dimensions = Some(v);
        }
        if let Some(v) = &args.index_path {
            self.index_path = v.clone();
        }
        if let Some(v) = args.top_k {
            self.top_k = v;
        }
        if let Some(v) = args.min_relevance {
            self.min_relevance = v;
        }
        if let Some(v) = args.embed_concurrency {
            self.embed_concurrency = v;
        }
        self
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.ollama_url.clone(),
            embedding_model: self.embedding_model.clone(),
            llm_model: self.llm_model.clone(),
            embedding_dimensions: self.embedding_dimensions,
            ..Default::default()
        }
    }

    pub fn rag_config(&self) -> Result<RagConfig> {
        let config = RagConfig {
            chunking: ChunkingConfig::new(self.chunk_size, self.overlap)?,
            index_path: self.index_path.clone(),
            top_k: self.top_k,
            min_relevance: self.min_relevance,
            embed_concurrency: self.embed_concurrency,
            retry: RetryConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn uses_hash_embeddings(&self) -> bool {
        self.embedding_model == HASH_EMBEDDING_MODEL
    }

    /// Wire providers and configuration into a pipeline
    pub fn pipeline(&self) -> Result<RagPipeline> {
        let client = OllamaClient::new(self.ollama_config())?;

        let embedder: Arc<dyn EmbeddingProvider> = if self.uses_hash_embeddings() {
            Arc::new(HashEmbedder::new(
                self.embedding_dimensions.unwrap_or(HashEmbedder::DEFAULT_DIMENSIONS),
            ))
        } else {
            Arc::new(client.embeddings())
        };

        RagPipeline::builder()
            .config(self.rag_config()?)
            .embedding_provider(embedder)
            .generator(Arc::new(client.chat()))
            .build()
    }
}
