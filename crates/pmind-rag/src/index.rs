//! In-memory vector index: build, insert, exact cosine search

use std::collections::BTreeSet;
use std::pin::pin;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use pmind_core::{
    Chunk, EmbeddedChunk, EmbeddingProvider, Error, QueryResult, Result, RetryConfig,
    retry_transient,
};

/// Similarity measure used for scoring; the only one is cosine in `[-1, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Cosine,
}

/// What a process needs to know to reload an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub dimensions: usize,
    pub embedding_model: String,
    pub metric: SimilarityMetric,
    pub created_at: DateTime<Utc>,
    pub build_id: Uuid,
}

/// Options for [`VectorIndex::build`]
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub retry: RetryConfig,
    /// Embedding requests kept in flight at once
    pub concurrency: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: 4,
        }
    }
}

/// A chunk left out of the index after its embedding kept failing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedChunk {
    pub source: String,
    pub sequence_index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub embedded: usize,
    pub dropped: Vec<DroppedChunk>,
}

/// Append-only collection of embedded chunks sharing one dimensionality.
///
/// Insertion order is kept and breaks score ties in [`VectorIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    metadata: IndexMetadata,
    entries: Vec<EmbeddedChunk>,
}

impl VectorIndex {
    pub const FORMAT_VERSION: u32 = 1;

    /// Create an empty index for vectors of `dimensions` length
    pub fn new(dimensions: usize, embedding_model: impl Into<String>) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidConfiguration(
                "index dimensionality must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            metadata: IndexMetadata {
                format_version: Self::FORMAT_VERSION,
                dimensions,
                embedding_model: embedding_model.into(),
                metric: SimilarityMetric::Cosine,
                created_at: Utc::now(),
                build_id: Uuid::new_v4(),
            },
            entries: Vec::new(),
        })
    }

    pub(crate) fn from_parts(metadata: IndexMetadata, entries: Vec<EmbeddedChunk>) -> Self {
        Self { metadata, entries }
    }

    /// Embed every chunk and assemble an index.
    ///
    /// Transient embedding failures are retried per `options.retry`; a chunk
    /// that still fails is dropped with a warning. Permanent provider errors
    /// and dimensionality violations abort the build.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<(Self, BuildReport)> {
        let dimensions = retry_transient(&options.retry, "dimensions", || embedder.dimensions()).await?;
        let mut index = Self::new(dimensions, embedder.model_id())?;
        let mut report = BuildReport::default();

        let retry = &options.retry;
        let mut embedded = pin!(
            stream::iter(chunks)
                .map(move |chunk| async move {
                    let vector = retry_transient(retry, "embed", || embedder.embed(&chunk.text)).await;
                    (chunk, vector)
                })
                .buffered(options.concurrency.max(1))
        );

        while let Some((chunk, vector)) = embedded.next().await {
            match vector {
                Ok(vector) => {
                    index.insert(EmbeddedChunk { chunk, vector })?;
                    report.embedded += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        source = %chunk.source,
                        chunk = chunk.sequence_index,
                        error = %e,
                        "dropping chunk after repeated embedding failures"
                    );
                    report.dropped.push(DroppedChunk {
                        source: chunk.source,
                        sequence_index: chunk.sequence_index,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            embedded = report.embedded,
            dropped = report.dropped.len(),
            dimensions,
            model = %index.metadata.embedding_model,
            "built vector index"
        );
        Ok((index, report))
    }

    /// Append one entry, enforcing the index dimensionality
    pub fn insert(&mut self, entry: EmbeddedChunk) -> Result<()> {
        if entry.dimensions() != self.metadata.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.metadata.dimensions,
                found: entry.dimensions(),
            });
        }
        if entry.vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::permanent(format!(
                "embedding for {} chunk {} contains non-finite values",
                entry.chunk.source, entry.chunk.sequence_index
            )));
        }

        self.entries.push(entry);
        Ok(())
    }

    /// The `top_k` most similar entries, best first, ties in insertion order
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        if top_k == 0 {
            return Err(Error::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if query_vector.len() != self.metadata.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.metadata.dimensions,
                found: query_vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query_vector, &entry.vector)))
            .collect();

        // sort_by is stable, so equal scores keep insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| QueryResult {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn dimensions(&self) -> usize {
        self.metadata.dimensions
    }

    pub fn entries(&self) -> &[EmbeddedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct provenance values in the index
    pub fn sources(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.chunk.source.as_str()).collect()
    }
}

/// Cosine similarity in `[-1, 1]`; 0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a * norm_b);
    if score.is_nan() { 0.0 } else { score.clamp(-1.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn entry(text: &str, source: &str, seq: usize, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk::new(text, source, seq),
            vector,
        }
    }

    /// Embeds by lookup and fails according to a per-text script
    struct ScriptedEmbedder {
        dimensions: usize,
        transient_failures: Mutex<HashMap<String, u32>>,
        permanent: Option<String>,
        wrong_dimension: Option<String>,
    }

    impl ScriptedEmbedder {
        fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                transient_failures: Mutex::new(HashMap::new()),
                permanent: None,
                wrong_dimension: None,
            }
        }

        fn fail_transiently(self, text: &str, times: u32) -> Self {
            self.transient_failures.lock().unwrap().insert(text.to_string(), times);
            self
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.permanent.as_deref() == Some(text) {
                return Err(Error::permanent("model not found"));
            }
            if let Some(remaining) = self.transient_failures.lock().unwrap().get_mut(text) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::transient("timeout"));
                }
            }
            if self.wrong_dimension.as_deref() == Some(text) {
                return Ok(vec![1.0; self.dimensions + 1]);
            }
            let mut v = vec![0.0; self.dimensions];
            v[text.len() % self.dimensions] = 1.0;
            Ok(v)
        }

        async fn dimensions(&self) -> Result<usize> {
            Ok(self.dimensions)
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(*t, "doc.txt", i))
            .collect()
    }

    fn fast_options() -> BuildOptions {
        BuildOptions {
            retry: RetryConfig::immediate(3),
            concurrency: 3,
        }
    }

    #[test]
    fn test_insert_rejects_mixed_dimensions() {
        let mut index = VectorIndex::new(3, "test").unwrap();
        index.insert(entry("a", "a.txt", 0, vec![1.0, 0.0, 0.0])).unwrap();

        let err = index.insert(entry("b", "b.txt", 0, vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, found: 2 }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_zero_dimensions_is_invalid() {
        assert!(matches!(
            VectorIndex::new(0, "test"),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_search_orders_by_score_and_breaks_ties_by_insertion() {
        let mut index = VectorIndex::new(2, "test").unwrap();
        index.insert(entry("low", "a.txt", 0, vec![0.0, 1.0])).unwrap();
        index.insert(entry("tie-first", "a.txt", 1, vec![1.0, 0.0])).unwrap();
        index.insert(entry("mid", "b.txt", 0, vec![1.0, 1.0])).unwrap();
        index.insert(entry("tie-second", "b.txt", 1, vec![2.0, 0.0])).unwrap();

        let results = index.search(&[1.0, 0.0], 10).unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(order, vec!["tie-first", "tie-second", "mid", "low"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results[3].score.abs() < 1e-6);
    }

    #[test]
    fn test_search_respects_top_k() {
        let mut index = VectorIndex::new(2, "test").unwrap();
        for i in 0..5 {
            index.insert(entry("x", "a.txt", i, vec![1.0, i as f32])).unwrap();
        }

        assert_eq!(index.search(&[1.0, 0.0], 3).unwrap().len(), 3);
        assert_eq!(index.search(&[1.0, 0.0], 50).unwrap().len(), 5);
        assert!(matches!(
            index.search(&[1.0, 0.0], 0),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(Error::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_build_preserves_chunk_order() {
        let embedder = ScriptedEmbedder::new(8);
        let input = chunks(&["one", "three", "fifteen", "x"]);

        let (index, report) = VectorIndex::build(input.clone(), &embedder, &fast_options())
            .await
            .unwrap();

        let built: Vec<Chunk> = index.entries().iter().map(|e| e.chunk.clone()).collect();
        assert_eq!(built, input);
        assert_eq!(report.embedded, 4);
        assert!(report.dropped.is_empty());
        assert_eq!(index.metadata().embedding_model, "scripted");
    }

    #[tokio::test]
    async fn test_build_retries_then_drops_chunk() {
        let embedder = ScriptedEmbedder::new(8)
            .fail_transiently("flaky", 2)
            .fail_transiently("dead", 10);
        let input = chunks(&["ok", "flaky", "dead", "fine"]);

        let (index, report) = VectorIndex::build(input, &embedder, &fast_options())
            .await
            .unwrap();

        let texts: Vec<&str> = index.entries().iter().map(|e| e.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["ok", "flaky", "fine"]);
        assert_eq!(report.embedded, 3);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].sequence_index, 2);
    }

    #[tokio::test]
    async fn test_build_aborts_on_permanent_error() {
        let mut embedder = ScriptedEmbedder::new(8);
        embedder.permanent = Some("bad".to_string());

        let err = VectorIndex::build(chunks(&["ok", "bad"]), &embedder, &fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_build_fails_fast_on_dimension_violation() {
        let mut embedder = ScriptedEmbedder::new(8);
        embedder.wrong_dimension = Some("odd".to_string());

        let err = VectorIndex::build(chunks(&["ok", "odd"]), &embedder, &fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 8, found: 9 }));
    }
}
