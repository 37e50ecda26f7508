//! Overlapping, boundary-aware chunking.
//!
//! Sizes are measured in chars. Each chunk ends at the best boundary inside a
//! lookback window ending at `chunk_size`: a paragraph break first, then a
//! sentence end, then any whitespace, and a hard cut when none exists. The
//! next chunk starts `overlap` chars before the previous one ended, so the
//! tail of chunk *i* is always the head of chunk *i + 1*.

use tracing::debug;

use pmind_core::{Chunk, ChunkingConfig, Document, Result};

/// Splits documents into overlapping chunks
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker, failing fast on an invalid configuration
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk every document, preserving document order
    pub fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|document| self.chunk_document(document))
            .collect()
    }

    /// Chunk a single document. Blank documents yield no chunks.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        if document.is_blank() {
            return Vec::new();
        }

        let chars: Vec<char> = document.content().chars().collect();
        let spans = split_spans(&chars, self.config.chunk_size, self.config.overlap);

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                Chunk::new(chars[start..end].iter().collect::<String>(), document.source(), i)
            })
            .collect();

        debug!(source = document.source(), chunks = chunks.len(), "chunked document");
        chunks
    }
}

/// Chunk documents with the given size and overlap.
///
/// Fails with `InvalidConfiguration` before touching any document when
/// `chunk_size == 0` or `overlap >= chunk_size`.
pub fn chunk_documents(documents: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(ChunkingConfig::new(chunk_size, overlap)?)?;
    Ok(chunker.chunk(documents))
}

/// Compute `[start, end)` char spans for one text
fn split_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        if len - start <= chunk_size {
            spans.push((start, len));
            break;
        }

        let limit = start + chunk_size;
        // an end at or below start + overlap would not advance the next start
        let floor = start + overlap.max(chunk_size / 2) + 1;
        let end = find_break(chars, floor, limit).unwrap_or(limit);

        spans.push((start, end));
        start = end - overlap;
    }

    spans
}

/// Find the preferred break position in `[floor, limit]`, nearest the limit.
///
/// Callers guarantee `limit < chars.len()`, so `chars[p]` is always valid.
fn find_break(chars: &[char], floor: usize, limit: usize) -> Option<usize> {
    let boundaries: [fn(&[char], usize) -> bool; 3] =
        [is_paragraph_break, is_sentence_break, is_word_break];

    boundaries
        .iter()
        .find_map(|is_boundary| (floor..=limit).rev().find(|&p| is_boundary(chars, p)))
}

/// A blank line ends right before `p`
fn is_paragraph_break(chars: &[char], p: usize) -> bool {
    if chars[p - 1] != '\n' {
        return false;
    }
    chars[..p - 1]
        .iter()
        .rev()
        .take_while(|c| c.is_whitespace())
        .any(|&c| c == '\n')
}

fn is_sentence_break(chars: &[char], p: usize) -> bool {
    let terminal = |c: char| matches!(c, '.' | '!' | '?');
    (terminal(chars[p - 1]) && chars[p].is_whitespace())
        || (p >= 2 && chars[p - 1].is_whitespace() && terminal(chars[p - 2]))
}

fn is_word_break(chars: &[char], p: usize) -> bool {
    chars[p - 1].is_whitespace() || chars[p].is_whitespace()
}
