//! Core traits and types for PromptMind
//!
//! This crate defines the data model shared by the ingestion and retrieval
//! pipeline (documents, chunks, search results), the error taxonomy, and the
//! capability-facing traits for embedding providers and text generators, so
//! that concrete backends and test doubles can be swapped freely.

pub mod document;
pub mod error;
pub mod provider;
pub mod retry;
pub mod types;


pub use document::{Chunk, Document, EmbeddedChunk, QueryResult};
pub use error::{Error, ProviderErrorKind, Result};
pub use provider::{EmbeddingProvider, GenerationConfig, GenerationResult, Generator};
pub use retry::retry_transient;
pub use types::*;
