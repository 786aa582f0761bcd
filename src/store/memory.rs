use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use super::{
    rank_and_truncate, Fingerprint, IndexEntry, IndexFilter, IndexStore, RunRecord, RunStatus,
    ScoredChunk,
};
use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::Chunk;

/// In-process index. Nothing survives the process.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, IndexEntry>>, IndexError> {
        self.entries
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, IndexEntry>>, IndexError> {
        self.entries
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))
    }

    fn runs(&self) -> Result<std::sync::MutexGuard<'_, Vec<RunRecord>>, IndexError> {
        self.runs
            .lock()
            .map_err(|_| IndexError::Unavailable("run log lock poisoned".into()))
    }
}

#[async_trait]
impl IndexStore for MemoryIndex {
    async fn begin_run(&self, source_id: &str) -> Result<i64, IndexError> {
        let mut runs = self.runs()?;
        let id = runs.len() as i64 + 1;
        runs.push(RunRecord {
            id,
            source_id: source_id.to_string(),
            started_at: chrono::Utc::now().timestamp(),
            finished_at: None,
            status: RunStatus::Running.as_str().to_string(),
        });
        Ok(id)
    }

    async fn finish_run(&self, run_id: i64, status: RunStatus) -> Result<(), IndexError> {
        let mut runs = self.runs()?;
        if let Some(run) = runs.iter_mut().find(|r| r.id == run_id) {
            run.finished_at = Some(chrono::Utc::now().timestamp());
            run.status = status.as_str().to_string();
        }
        Ok(())
    }

    async fn last_run(&self, source_id: &str) -> Result<Option<RunRecord>, IndexError> {
        Ok(self
            .runs()?
            .iter()
            .rev()
            .find(|r| r.source_id == source_id)
            .cloned())
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        self.write()?.insert(entry.chunk.id.clone(), entry.clone());
        Ok(())
    }

    async fn upsert_many(&self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        let mut map = self.write()?;
        for entry in entries {
            map.insert(entry.chunk.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let map = self.read()?;
        let mut scored: Vec<ScoredChunk> = map
            .values()
            .filter(|e| filter.matches(&e.chunk))
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        rank_and_truncate(&mut scored, k);
        Ok(scored)
    }

    async fn delete_where(
        &self,
        source_id: &str,
        stale_before_run_id: i64,
    ) -> Result<u64, IndexError> {
        let mut map = self.write()?;
        let before = map.len();
        map.retain(|_, e| !(e.chunk.source_id == source_id && e.run_id < stale_before_run_id));
        Ok((before - map.len()) as u64)
    }

    async fn count(&self, filter: &IndexFilter) -> Result<u64, IndexError> {
        Ok(self
            .read()?
            .values()
            .filter(|e| filter.matches(&e.chunk))
            .count() as u64)
    }

    async fn count_documents(&self, filter: &IndexFilter) -> Result<u64, IndexError> {
        Ok(self
            .read()?
            .values()
            .filter(|e| filter.matches(&e.chunk))
            .map(|e| e.chunk.document_id.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u64)
    }

    async fn list_source_chunks(&self, source_id: &str) -> Result<Vec<Chunk>, IndexError> {
        // BTreeMap iteration is already ordered by chunk id.
        Ok(self
            .read()?
            .values()
            .filter(|e| e.chunk.source_id == source_id)
            .map(|e| e.chunk.clone())
            .collect())
    }

    async fn fingerprints(
        &self,
        source_id: &str,
    ) -> Result<HashMap<String, Fingerprint>, IndexError> {
        Ok(self
            .read()?
            .values()
            .filter(|e| e.chunk.source_id == source_id)
            .map(|e| {
                (
                    e.chunk.id.clone(),
                    Fingerprint {
                        chunk: e.chunk.clone(),
                        model: e.model.clone(),
                    },
                )
            })
            .collect())
    }

    async fn touch_chunks(&self, ids: &[String], run_id: i64) -> Result<(), IndexError> {
        let mut map = self.write()?;
        for id in ids {
            if let Some(e) = map.get_mut(id) {
                e.run_id = run_id;
            }
        }
        Ok(())
    }

    async fn touch_document(&self, document_id: &str, run_id: i64) -> Result<u64, IndexError> {
        let mut map = self.write()?;
        let mut touched = 0;
        for e in map.values_mut().filter(|e| e.chunk.document_id == document_id) {
            e.run_id = run_id;
            touched += 1;
        }
        Ok(touched)
    }
}
