//! Index store: the persistent vector collection.
//!
//! Entries are keyed by chunk id and carry the chunk's text and metadata
//! (including `source_id` and `priority`), its vector, the model that
//! produced it and the ingestion run that last wrote or confirmed it.
//!
//! Two implementations:
//! - [`SqliteIndex`]: the on-disk store used by the CLI and server.
//! - [`MemoryIndex`]: a `BTreeMap` behind a lock, for tests and dry runs.
//!
//! Similarity is cosine, computed in Rust over the filtered entries.
//! Results are ordered by descending score with ties broken by ascending
//! chunk id, so equal inputs always rank identically.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::IndexError;
use crate::models::Chunk;

/// A chunk plus the vector to store for it.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub model: String,
    pub run_id: i64,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// What the pipeline needs to decide whether a chunk must be re-embedded:
/// the stored chunk (text hash and metadata) and the model of its vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub chunk: Chunk,
    pub model: String,
}

impl Fingerprint {
    /// True when `chunk` can keep the stored vector as is.
    pub fn is_current(&self, chunk: &Chunk, model: &str) -> bool {
        self.model == model && self.chunk.hash == chunk.hash && self.chunk == *chunk
    }
}

/// Restricts queries and counts. Empty `sources` means every source.
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub sources: Vec<String>,
    pub version_tag: Option<String>,
}

impl IndexFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn source(id: &str) -> Self {
        Self {
            sources: vec![id.to_string()],
            version_tag: None,
        }
    }

    pub fn sources(ids: Vec<String>) -> Self {
        Self {
            sources: ids,
            version_tag: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version_tag = version;
        self
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        (self.sources.is_empty() || self.sources.iter().any(|s| *s == chunk.source_id))
            && self
                .version_tag
                .as_ref()
                .is_none_or(|v| *v == chunk.metadata.version_tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One recorded ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub source_id: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: String,
}

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Allocate a run id for one ingestion of `source_id`. Run ids increase
    /// monotonically across all sources.
    async fn begin_run(&self, source_id: &str) -> Result<i64, IndexError>;

    async fn finish_run(&self, run_id: i64, status: RunStatus) -> Result<(), IndexError>;

    async fn last_run(&self, source_id: &str) -> Result<Option<RunRecord>, IndexError>;

    /// Insert or replace the entry with the same chunk id.
    async fn upsert(&self, entry: &IndexEntry) -> Result<(), IndexError>;

    async fn upsert_many(&self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        for entry in entries {
            self.upsert(entry).await?;
        }
        Ok(())
    }

    /// Top `k` entries by cosine similarity to `vector`.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Remove entries of `source_id` whose run id is older than
    /// `stale_before_run_id`. Returns the number removed.
    async fn delete_where(&self, source_id: &str, stale_before_run_id: i64)
        -> Result<u64, IndexError>;

    async fn count(&self, filter: &IndexFilter) -> Result<u64, IndexError>;

    /// Number of distinct documents with at least one chunk matching `filter`.
    async fn count_documents(&self, filter: &IndexFilter) -> Result<u64, IndexError>;

    /// Every chunk of a source, ordered by chunk id.
    async fn list_source_chunks(&self, source_id: &str) -> Result<Vec<Chunk>, IndexError>;

    async fn fingerprints(&self, source_id: &str)
        -> Result<HashMap<String, Fingerprint>, IndexError>;

    /// Stamp existing entries with `run_id` without rewriting them.
    async fn touch_chunks(&self, ids: &[String], run_id: i64) -> Result<(), IndexError>;

    /// Stamp every chunk of a document with `run_id`, keeping its previous
    /// version alive through pruning. Returns the number of chunks touched.
    async fn touch_document(&self, document_id: &str, run_id: i64) -> Result<u64, IndexError>;
}

/// Sort by score descending, then chunk id ascending, and keep `k`.
pub(crate) fn rank_and_truncate(scored: &mut Vec<ScoredChunk>, k: usize) {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(k);
}
