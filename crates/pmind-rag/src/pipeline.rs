//! Ingestion and query orchestration.
//!
//! [`RagPipeline`] runs sources through load, chunk, embed and persist, and
//! answers questions against the persisted index through retrieve and
//! compose. Providers and configuration are passed in explicitly, so several
//! pipelines with different providers can coexist in one process.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};

use pmind_core::{
    ChunkingConfig, EmbeddingProvider, Error, Generator, IndexingReport, Result, RetryConfig,
    retry_transient,
};

use crate::chunker::Chunker;
use crate::composer::AnswerComposer;
use crate::index::{BuildOptions, VectorIndex};
use crate::loader::DocumentLoader;
use crate::retriever::{Retrieval, Retriever, RetrieverConfig};

pub const DEFAULT_INDEX_PATH: &str = "vector_store";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    /// Directory holding the persisted index
    pub index_path: PathBuf,
    pub top_k: usize,
    /// Minimum cosine similarity for retrieved chunks
    pub min_relevance: f32,
    /// Embedding requests in flight while building
    pub embed_concurrency: usize,
    pub retry: RetryConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            top_k: 10,
            min_relevance: 0.3,
            embed_concurrency: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl RagConfig {
    /// Reject inconsistent parameters before any work is done
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retriever_config().validate()?;
        if self.embed_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "embed_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retriever_config(&self) -> RetrieverConfig {
        RetrieverConfig {
            top_k: self.top_k,
            min_relevance: self.min_relevance,
            retry: self.retry.clone(),
        }
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            retry: self.retry.clone(),
            concurrency: self.embed_concurrency,
        }
    }
}

/// A generated answer with the context it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    /// Generator output, unmodified
    pub text: String,
    pub model_id: String,
    pub retrieval: Retrieval,
}

pub struct RagPipeline {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    loader: DocumentLoader,
}

impl RagPipeline {
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Load, chunk, embed and persist `sources`, replacing the index at
    /// `index_path`.
    ///
    /// Per-source and per-chunk failures are counted in the report, not
    /// returned. When nothing loadable is found the existing index is left
    /// untouched and `persisted` is false.
    pub async fn index_sources<S: AsRef<str>>(&self, sources: &[S]) -> Result<IndexingReport> {
        let span = info_span!("index_sources", sources = sources.len());
        self.index_sources_inner(sources).instrument(span).await
    }

    async fn index_sources_inner<S: AsRef<str>>(&self, sources: &[S]) -> Result<IndexingReport> {
        let chunker = Chunker::new(self.config.chunking)?;
        let loaded = self.loader.load_many(sources).await;

        let mut report = IndexingReport {
            sources_loaded: loaded.loaded.len(),
            sources_skipped: loaded.empty.len() + loaded.failed.len(),
            files_skipped: loaded.files_skipped.len(),
            errors: loaded
                .failed
                .iter()
                .chain(&loaded.files_skipped)
                .map(|skipped| format!("{}: {}", skipped.source, skipped.reason))
                .collect(),
            ..Default::default()
        };

        let (documents, blank): (Vec<_>, Vec<_>) =
            loaded.documents.into_iter().partition(|d| !d.is_blank());
        for document in &blank {
            debug!(source = document.source(), "dropping document with no text");
        }
        report.documents = documents.len();
        report.empty_documents_dropped = blank.len();

        if documents.is_empty() {
            warn!("no documents found, leaving existing index untouched");
            return Ok(report);
        }

        let chunks = chunker.chunk(&documents);
        info!(documents = documents.len(), chunks = chunks.len(), "chunked documents");

        let (index, build) =
            VectorIndex::build(chunks, self.embedder.as_ref(), &self.config.build_options()).await?;
        report.chunks_indexed = build.embedded;
        report.chunks_dropped = build.dropped.len();
        report.errors.extend(build.dropped.iter().map(|dropped| {
            format!(
                "{} chunk {}: {}",
                dropped.source, dropped.sequence_index, dropped.error
            )
        }));

        if index.is_empty() {
            warn!("every chunk failed to embed, leaving existing index untouched");
            return Ok(report);
        }

        let path = self.config.index_path.clone();
        tokio::task::spawn_blocking(move || index.persist(path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        report.persisted = true;

        info!(
            documents = report.documents,
            chunks = report.chunks_indexed,
            dropped = report.chunks_dropped,
            "indexing finished"
        );
        Ok(report)
    }

    /// Load the persisted index for the configured embedding provider
    pub async fn open(&self) -> Result<QuerySession<'_>> {
        let dimensions =
            retry_transient(&self.config.retry, "dimensions", || self.embedder.dimensions()).await?;
        let model = self.embedder.model_id().to_string();
        let path = self.config.index_path.clone();

        let index = tokio::task::spawn_blocking(move || VectorIndex::load(path, dimensions, &model))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        Ok(QuerySession {
            pipeline: self,
            index,
        })
    }

    /// Open the index and answer a single question
    pub async fn query(&self, question: &str) -> Result<Answer> {
        self.open().await?.ask(question).await
    }
}

/// A loaded, read-only index ready to answer questions
pub struct QuerySession<'a> {
    pipeline: &'a RagPipeline,
    index: VectorIndex,
}

impl QuerySession<'_> {
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Retrieve context for `question` and generate a grounded answer
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let span = info_span!("ask", question_chars = question.chars().count());
        async {
            let config = &self.pipeline.config;
            let retriever = Retriever::new(
                &self.index,
                self.pipeline.embedder.as_ref(),
                config.retriever_config(),
            )?;
            let retrieval = retriever.retrieve(question).await?;

            if retrieval.is_empty() {
                info!("no relevant context, asking generator to decline");
            }

            let composer = AnswerComposer::new(self.pipeline.generator.as_ref(), config.retry.clone());
            let generated = composer.compose(question, &retrieval.chunks()).await?;

            Ok::<_, Error>(Answer {
                question: question.to_string(),
                text: generated.text,
                model_id: generated.model_id,
                retrieval,
            })
        }
        .instrument(span)
        .await
    }
}

/// Builder for [`RagPipeline`]. Both providers are required.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: RagConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn Generator>>,
}

impl RagPipelineBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(provider);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Validate the configuration and assemble the pipeline
    pub fn build(self) -> Result<RagPipeline> {
        self.config.validate()?;

        let embedder = self.embedder.ok_or_else(|| {
            Error::InvalidConfiguration("an embedding provider is required".to_string())
        })?;
        let generator = self
            .generator
            .ok_or_else(|| Error::InvalidConfiguration("a generator is required".to_string()))?;

        Ok(RagPipeline {
            config: self.config,
            embedder,
            generator,
            loader: DocumentLoader::new()?,
        })
    }
}
