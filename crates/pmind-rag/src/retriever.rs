//! Query embedding, search and relevance filtering

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pmind_core::{Chunk, EmbeddingProvider, Error, QueryResult, Result, RetryConfig, retry_transient};

use crate::index::VectorIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    pub top_k: usize,
    /// Minimum cosine similarity, on the `[-1, 1]` scale
    pub min_relevance: f32,
    pub retry: RetryConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_relevance: 0.3,
            retry: RetryConfig::default(),
        }
    }
}

impl RetrieverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.min_relevance.is_nan() {
            return Err(Error::InvalidConfiguration(
                "min_relevance must be a number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Results that survived the relevance filter, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub results: Vec<QueryResult>,
    /// Distinct provenance of the surviving results
    pub sources: BTreeSet<String>,
}

impl Retrieval {
    pub fn chunks(&self) -> Vec<Chunk> {
        self.results.iter().map(|r| r.chunk.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Answers "which chunks are relevant to this query" against a loaded index
pub struct Retriever<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn EmbeddingProvider,
    config: RetrieverConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        index: &'a VectorIndex,
        embedder: &'a dyn EmbeddingProvider,
        config: RetrieverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Embed `query`, search, and drop results scoring below `min_relevance`.
    ///
    /// An empty retrieval is a valid outcome, not an error.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        let query_vector =
            retry_transient(&self.config.retry, "embed query", || self.embedder.embed(query)).await?;

        let hits = self.index.search(&query_vector, self.config.top_k)?;
        let candidates = hits.len();

        let results: Vec<QueryResult> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.config.min_relevance)
            .collect();
        let sources: BTreeSet<String> = results.iter().map(|r| r.chunk.source.clone()).collect();

        debug!(
            candidates,
            kept = results.len(),
            min_relevance = self.config.min_relevance,
            "filtered search results"
        );
        info!(fragments = results.len(), sources = ?sources, "retrieved context");

        Ok(Retrieval { results, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashEmbedder;
    use pmind_core::EmbeddedChunk;

    fn index_of(embedder: &HashEmbedder, texts: &[(&str, &str)]) -> VectorIndex {
        let mut index = VectorIndex::new(embedder.embed_text("").len(), "hash").unwrap();
        for (i, (text, source)) in texts.iter().enumerate() {
            index
                .insert(EmbeddedChunk {
                    chunk: Chunk::new(*text, *source, i),
                    vector: embedder.embed_text(text),
                })
                .unwrap();
        }
        index
    }

    fn config(top_k: usize, min_relevance: f32) -> RetrieverConfig {
        RetrieverConfig {
            top_k,
            min_relevance,
            retry: RetryConfig::immediate(1),
        }
    }

    #[tokio::test]
    async fn test_filters_below_min_relevance() {
        let embedder = HashEmbedder::new(256);
        let index = index_of(
            &embedder,
            &[
                ("rust ownership and borrowing", "rust.md"),
                ("baking sourdough bread", "bread.md"),
            ],
        );

        let retriever = Retriever::new(&index, &embedder, config(10, 0.3)).unwrap();
        let retrieval = retriever.retrieve("ownership in rust").await.unwrap();

        assert_eq!(retrieval.results.len(), 1);
        assert_eq!(retrieval.results[0].chunk.source, "rust.md");
        assert_eq!(retrieval.sources.iter().collect::<Vec<_>>(), vec!["rust.md"]);
    }

    #[tokio::test]
    async fn test_unreachable_threshold_yields_empty_retrieval() {
        let embedder = HashEmbedder::new(256);
        let index = index_of(&embedder, &[("exact match", "a.txt")]);

        let retriever = Retriever::new(&index, &embedder, config(5, 1.01)).unwrap();
        let retrieval = retriever.retrieve("exact match").await.unwrap();

        assert!(retrieval.is_empty());
        assert!(retrieval.sources.is_empty());
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch() {
        let index = index_of(&HashEmbedder::new(384), &[("sky", "a.txt")]);
        let wide = HashEmbedder::new(768);

        let retriever = Retriever::new(&index, &wide, config(1, 0.0)).unwrap();
        let err = retriever.retrieve("sky").await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 384, found: 768 }));
    }

    #[test]
    fn test_config_validation() {
        let embedder = HashEmbedder::new(8);
        let index = VectorIndex::new(8, "hash").unwrap();
        assert!(Retriever::new(&index, &embedder, config(0, 0.3)).is_err());
        assert!(Retriever::new(&index, &embedder, config(3, f32::NAN)).is_err());
        assert!(RetrieverConfig::default().validate().is_ok());
    }
}
