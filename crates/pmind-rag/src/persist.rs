//! On-disk index format.
//!
//! An index directory holds an `index.json` manifest and one
//! `chunks-<id>.jsonl` file with a record per entry, vectors stored as
//! base64 little-endian `f32`. The chunk file is written first and the
//! manifest replaced atomically afterwards, so a reader sees either the old
//! index or the new one.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pmind_core::{Chunk, EmbeddedChunk, Error, Result};

use crate::index::{IndexMetadata, VectorIndex};

pub const MANIFEST_FILE: &str = "index.json";
const CHUNKS_PREFIX: &str = "chunks-";
const CHUNKS_SUFFIX: &str = ".jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    #[serde(flatten)]
    metadata: IndexMetadata,
    chunk_count: usize,
    chunks_file: String,
    chunks_md5: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    text: String,
    source: String,
    sequence_index: usize,
    vector: String,
}

fn encode_vector(vector: &[f32]) -> String {
    let bytes: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

fn decode_vector(encoded: &str) -> Option<Vec<f32>> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

fn persist_err(e: tempfile::PersistError) -> Error {
    Error::Io(e.error)
}

impl VectorIndex {
    /// Write the index under `dir`, replacing any index already there
    pub fn persist(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let chunks_file = format!("{}{}{}", CHUNKS_PREFIX, Uuid::new_v4().simple(), CHUNKS_SUFFIX);
        let mut checksum = md5::Context::new();

        let staged = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(staged.as_file());
            for entry in self.entries() {
                let record = ChunkRecord {
                    text: entry.chunk.text.clone(),
                    source: entry.chunk.source.clone(),
                    sequence_index: entry.chunk.sequence_index,
                    vector: encode_vector(&entry.vector),
                };
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                checksum.consume(&line);
                writer.write_all(&line)?;
            }
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        staged.persist(dir.join(&chunks_file)).map_err(persist_err)?;

        let manifest = Manifest {
            metadata: self.metadata().clone(),
            chunk_count: self.len(),
            chunks_file: chunks_file.clone(),
            chunks_md5: format!("{:x}", checksum.compute()),
        };
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(&serde_json::to_vec_pretty(&manifest)?)?;
        staged.as_file().sync_all()?;
        staged.persist(dir.join(MANIFEST_FILE)).map_err(persist_err)?;

        remove_stale_chunk_files(dir, &chunks_file);

        info!(
            path = %dir.display(),
            chunks = self.len(),
            dimensions = self.dimensions(),
            "persisted vector index"
        );
        Ok(())
    }

    /// Load the index under `dir` for an embedding configuration.
    ///
    /// A missing, partial or corrupt index is `IndexNotFound`. An index built
    /// with a different dimensionality is `DimensionMismatch`; a different
    /// model name with equal dimensionality only warns.
    pub fn load(dir: impl AsRef<Path>, dimensions: usize, embedding_model: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let location = dir.display().to_string();
        let not_found = |reason: String| Error::index_not_found(location.clone(), reason);

        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = fs::read(&manifest_path)
            .map_err(|e| not_found(format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| not_found(format!("malformed {}: {}", MANIFEST_FILE, e)))?;

        if manifest.metadata.format_version != Self::FORMAT_VERSION {
            return Err(not_found(format!(
                "unsupported format version {}",
                manifest.metadata.format_version
            )));
        }
        if manifest.metadata.dimensions != dimensions {
            return Err(Error::DimensionMismatch {
                expected: dimensions,
                found: manifest.metadata.dimensions,
            });
        }
        if manifest.metadata.embedding_model != embedding_model {
            warn!(
                index_model = %manifest.metadata.embedding_model,
                configured_model = embedding_model,
                "index was built with a different embedding model"
            );
        }
        if manifest.chunks_file.contains(['/', '\\']) {
            return Err(not_found(format!("invalid chunk file name '{}'", manifest.chunks_file)));
        }

        let body = fs::read(dir.join(&manifest.chunks_file))
            .map_err(|e| not_found(format!("cannot read {}: {}", manifest.chunks_file, e)))?;
        if format!("{:x}", md5::compute(&body)) != manifest.chunks_md5 {
            return Err(not_found(format!("checksum mismatch in {}", manifest.chunks_file)));
        }

        let text = std::str::from_utf8(&body)
            .map_err(|_| not_found(format!("{} is not valid UTF-8", manifest.chunks_file)))?;

        let mut entries = Vec::with_capacity(manifest.chunk_count);
        for (line_no, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let record: ChunkRecord = serde_json::from_str(line)
                .map_err(|e| not_found(format!("malformed record on line {}: {}", line_no + 1, e)))?;
            let vector = decode_vector(&record.vector)
                .ok_or_else(|| not_found(format!("undecodable vector on line {}", line_no + 1)))?;
            if vector.len() != dimensions {
                return Err(not_found(format!(
                    "record on line {} has {} dimensions, manifest says {}",
                    line_no + 1,
                    vector.len(),
                    dimensions
                )));
            }
            entries.push(EmbeddedChunk {
                chunk: Chunk::new(record.text, record.source, record.sequence_index),
                vector,
            });
        }

        if entries.len() != manifest.chunk_count {
            return Err(not_found(format!(
                "expected {} records, found {}",
                manifest.chunk_count,
                entries.len()
            )));
        }

        info!(path = %location, chunks = entries.len(), dimensions, "loaded vector index");
        Ok(Self::from_parts(manifest.metadata, entries))
    }
}

/// True when `dir` holds an index manifest
pub fn index_exists(dir: impl AsRef<Path>) -> bool {
    dir.as_ref().join(MANIFEST_FILE).is_file()
}

fn remove_stale_chunk_files(dir: &Path, live: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == live || !name.starts_with(CHUNKS_PREFIX) || !name.ends_with(CHUNKS_SUFFIX) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => debug!(file = name, "removed stale chunk file"),
            Err(e) => warn!(file = name, error = %e, "failed to remove stale chunk file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(3, "test-model").unwrap();
        index
            .insert(EmbeddedChunk {
                chunk: Chunk::new("The sky is blue. ", "a.txt", 0),
                vector: vec![0.25, -1.5, 3.0e-8],
            })
            .unwrap();
        index
            .insert(EmbeddedChunk {
                chunk: Chunk::new("Paris is the capital", "b.txt", 0),
                vector: vec![1.0, 0.0, -0.0],
            })
            .unwrap();
        index
    }

    fn chunk_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.starts_with(CHUNKS_PREFIX))
            .collect()
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let index = sample_index();
        index.persist(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), 3, "test-model").unwrap();
        assert_eq!(loaded, index);
        assert_eq!(
            loaded.search(&[1.0, 0.0, 0.0], 2).unwrap(),
            index.search(&[1.0, 0.0, 0.0], 2).unwrap()
        );
    }

    #[test]
    fn test_missing_index_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = VectorIndex::load(dir.path().join("nowhere"), 3, "test-model").unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
        assert!(!index_exists(dir.path()));
    }

    #[test]
    fn test_dimension_mismatch_on_load() {
        let dir = TempDir::new().unwrap();
        sample_index().persist(dir.path()).unwrap();

        let err = VectorIndex::load(dir.path(), 768, "test-model").unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 768, found: 3 }));
    }

    #[test]
    fn test_other_model_with_same_dimensions_loads() {
        let dir = TempDir::new().unwrap();
        sample_index().persist(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), 3, "another-model").unwrap();
        assert_eq!(loaded.metadata().embedding_model, "test-model");
    }

    #[test]
    fn test_corrupted_chunk_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        sample_index().persist(dir.path()).unwrap();

        let name = chunk_files(dir.path()).pop().unwrap();
        let path = dir.path().join(name);
        let mut body = fs::read_to_string(&path).unwrap();
        body.push_str("{\"truncated\":");
        fs::write(&path, body).unwrap();

        let err = VectorIndex::load(dir.path(), 3, "test-model").unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
    }

    #[test]
    fn test_malformed_manifest_is_not_found() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();

        let err = VectorIndex::load(dir.path(), 3, "test-model").unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
    }

    #[test]
    fn test_repersist_replaces_previous_index() {
        let dir = TempDir::new().unwrap();
        sample_index().persist(dir.path()).unwrap();

        let mut smaller = VectorIndex::new(3, "test-model").unwrap();
        smaller
            .insert(EmbeddedChunk {
                chunk: Chunk::new("only", "c.txt", 0),
                vector: vec![0.0, 1.0, 0.0],
            })
            .unwrap();
        smaller.persist(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path(), 3, "test-model").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(chunk_files(dir.path()).len(), 1);
        assert!(index_exists(dir.path()));
    }

    #[test]
    fn test_vector_encoding_is_little_endian() {
        assert_eq!(encode_vector(&[1.0]), STANDARD.encode(1.0f32.to_le_bytes()));
        assert_eq!(decode_vector(&encode_vector(&[0.5, -2.0])), Some(vec![0.5, -2.0]));
        assert_eq!(decode_vector(&STANDARD.encode([1u8, 2, 3])), None);
    }
}
