//! Ollama integration for PromptMind
//!
//! This crate provides the Ollama implementations of the `EmbeddingProvider`
//! and `Generator` traits.

mod client;
mod config;

#[cfg(test)]
mod tests;

pub use client::{OllamaClient, OllamaEmbedder, OllamaGenerator};
pub use config::{DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL, DEFAULT_OLLAMA_URL, OllamaConfig};

// Re-export core types for convenience
pub use pmind_core::{EmbeddingProvider, Error, GenerationConfig, GenerationResult, Generator, Result};
