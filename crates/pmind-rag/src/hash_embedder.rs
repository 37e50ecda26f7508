//! Deterministic feature-hashing embeddings

use async_trait::async_trait;

use pmind_core::{EmbeddingProvider, Error, Result};

/// Bag-of-words embedding provider that needs no model server.
///
/// Each lowercase alphanumeric token is hashed (MD5, so the mapping is stable
/// across processes and toolchains) into one of `dimensions` buckets, and the
/// resulting count vector is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    /// Default dimensionality
    pub const DEFAULT_DIMENSIONS: usize = 384;

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_id: format!("hash-bow-{}", dimensions),
        }
    }

    /// Tokens fed to the hash: lowercase alphanumeric runs
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = md5::compute(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.0[..8]);
        (u64::from_le_bytes(head) % self.dimensions as u64) as usize
    }

    /// Synchronous embedding, also used by tests. Empty when the embedder
    /// has no dimensions.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        if self.dimensions == 0 {
            return Vec::new();
        }
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in Self::tokenize(text) {
            embedding[self.bucket(&token)] += 1.0;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in embedding.iter_mut() {
                *value /= magnitude;
            }
        }

        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(Error::InvalidConfiguration(
                "hash embedder needs at least one dimension".to_string(),
            ));
        }
        Ok(self.embed_text(text))
    }

    async fn dimensions(&self) -> Result<usize> {
        Ok(self.dimensions)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
