//! Documents, chunks and search results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One loaded unit of text: a file, or a fetched page.
///
/// `source` is the provenance of the text (path or URL) and is never empty.
/// Documents are immutable once the loader has produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    source: String,
    metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document, rejecting an empty provenance
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "document source must not be empty".to_string(),
            ));
        }

        Ok(Self {
            content: content.into(),
            source,
            metadata: BTreeMap::new(),
        })
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// True when there is no text worth chunking
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A size-bounded slice of a document's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub sequence_index: usize,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            sequence_index,
        }
    }

    /// Stable identifier derived from provenance and position
    pub fn id(&self) -> String {
        format!(
            "{:x}-{}",
            md5::compute(self.source.as_bytes()),
            self.sequence_index
        )
    }

    /// Length in the unit chunk sizes are measured in (chars)
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A chunk together with its embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// A search hit. `score` is cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunk: Chunk,
    pub score: f32,
}
