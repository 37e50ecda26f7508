//! Document ingestion, vector index and grounded answering for PromptMind
//!
//! The ingestion side turns sources into [`Document`]s ([`DocumentLoader`]),
//! splits them into overlapping [`Chunk`]s ([`Chunker`]) and embeds them into
//! a [`VectorIndex`] that persists to a directory. The query side embeds a
//! question, keeps the relevant chunks ([`Retriever`]) and asks a generator
//! to answer from them alone ([`AnswerComposer`]). [`RagPipeline`] wires the
//! two together.

pub mod chunker;
pub mod composer;
pub mod hash_embedder;
pub mod index;
pub mod loader;
pub mod persist;
pub mod pipeline;
pub mod retriever;


pub use chunker::{Chunker, chunk_documents};
pub use composer::{AnswerComposer, CONTEXT_DELIMITER, NO_CONTEXT_INSTRUCTION, build_prompt};
pub use hash_embedder::HashEmbedder;
pub use index::{
    BuildOptions, BuildReport, DroppedChunk, IndexMetadata, SimilarityMetric, VectorIndex,
    cosine_similarity,
};
pub use loader::{DocumentLoader, LoadReport, LoaderKind, SkippedSource, load_file};
pub use persist::{MANIFEST_FILE, index_exists};
pub use pipeline::{
    Answer, DEFAULT_INDEX_PATH, QuerySession, RagConfig, RagPipeline, RagPipelineBuilder,
};
pub use retriever::{Retrieval, Retriever, RetrieverConfig};

pub use pmind_core::{Chunk, Document, Error, QueryResult, Result};
