//! Common types used across the PromptMind pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Outcome of an operation that may legitimately find nothing.
///
/// `Empty` is not a failure: callers log the reason and move on.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Empty { reason: String },
}

impl<T> Lookup<T> {
    pub fn empty(reason: impl Into<String>) -> Self {
        Lookup::Empty {
            reason: reason.into(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// The found value, or `None` for an empty outcome
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Empty { .. } => None,
        }
    }
}

impl<T: Default> Lookup<T> {
    pub fn unwrap_or_default(self) -> T {
        self.found().unwrap_or_default()
    }
}

/// Configuration for retry behavior on transient provider errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Retry configuration that never sleeps, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retrying after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Chunk size and overlap, measured in chars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            overlap: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject `chunk_size == 0` and `overlap >= chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfiguration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Counts reported by an indexing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingReport {
    pub sources_loaded: usize,
    pub sources_skipped: usize,
    /// Unreadable files inside directory sources
    pub files_skipped: usize,
    pub documents: usize,
    pub empty_documents_dropped: usize,
    pub chunks_indexed: usize,
    pub chunks_dropped: usize,
    pub persisted: bool,
    pub errors: Vec<String>,
}
