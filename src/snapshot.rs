//! Snapshot manager for pinned sources.
//!
//! A snapshot freezes every chunk of a pinned source (text and metadata,
//! never vectors) so the corpus for that version can be re-embedded later
//! even after upstream has moved on. Layout:
//!
//! ```text
//! <snapshots.dir>/
//!   omarchy@3.2.3/
//!     manifest.json   # source, version, counts, creation time
//!     chunks.json     # records sorted by chunk id, pretty-printed
//! ```
//!
//! Snapshots are plain files meant to be committed to version control;
//! sorted records and pretty JSON keep diffs between freezes readable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::SnapshotError;
use crate::models::{chunk_id, content_hash, Chunk, ChunkMetadata};
use crate::sources::{SourceEntry, SourceRegistry};
use crate::store::IndexStore;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub source_id: String,
    pub version: String,
    pub created_at: String,
    pub document_count: usize,
    pub chunk_count: usize,
}

/// One frozen chunk. Source and priority live in the manifest and the
/// registry respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotRecord {
    id: String,
    document_id: String,
    chunk_index: i64,
    word_count: usize,
    hash: String,
    metadata: ChunkMetadata,
    text: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    dir: PathBuf,
    registry: SourceRegistry,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>, registry: SourceRegistry) -> Self {
        Self {
            dir: dir.into(),
            registry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, source_id: &str, version: &str) -> PathBuf {
        self.dir.join(format!("{}@{}", source_id, version))
    }

    pub fn exists(&self, source_id: &str, version: &str) -> bool {
        self.path_for(source_id, version).join(MANIFEST_FILE).is_file()
    }

    fn pinned_entry(&self, source_id: &str) -> Result<(&SourceEntry, String), SnapshotError> {
        let entry = self
            .registry
            .get(source_id)
            .ok_or_else(|| SnapshotError::UnknownSource(source_id.to_string()))?;
        match (&entry.pinned, &entry.version) {
            (true, Some(version)) => Ok((entry, version.clone())),
            _ => Err(SnapshotError::NotPinned(source_id.to_string())),
        }
    }

    /// Freeze the chunks currently indexed for a pinned source.
    pub async fn freeze(
        &self,
        store: &dyn IndexStore,
        source_id: &str,
        overwrite: bool,
    ) -> Result<SnapshotManifest, SnapshotError> {
        self.pinned_entry(source_id)?;
        let chunks = store.list_source_chunks(source_id).await?;
        self.freeze_chunks(source_id, chunks, overwrite)
    }

    /// Write `chunks` as the snapshot of a pinned source's pinned version.
    ///
    /// A snapshot is immutable once written: an existing one for the same
    /// version is only replaced when `overwrite` is set.
    pub fn freeze_chunks(
        &self,
        source_id: &str,
        chunks: Vec<Chunk>,
        overwrite: bool,
    ) -> Result<SnapshotManifest, SnapshotError> {
        let (entry, version) = self.pinned_entry(source_id)?;
        if !overwrite && self.exists(&entry.id, &version) {
            return Err(SnapshotError::AlreadyExists {
                source_id: entry.id.clone(),
                version,
            });
        }
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| c.source_id == entry.id)
            .collect();
        if chunks.is_empty() {
            return Err(SnapshotError::NothingToFreeze(source_id.to_string()));
        }

        let mut records: Vec<SnapshotRecord> = chunks
            .into_iter()
            .map(|c| SnapshotRecord {
                id: c.id,
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                word_count: c.word_count,
                hash: c.hash,
                metadata: c.metadata,
                text: c.text,
            })
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        records.dedup_by(|a, b| a.id == b.id);

        let documents: BTreeSet<&str> = records.iter().map(|r| r.document_id.as_str()).collect();
        let manifest = SnapshotManifest {
            source_id: entry.id.clone(),
            version: version.clone(),
            created_at: Utc::now().to_rfc3339(),
            document_count: documents.len(),
            chunk_count: records.len(),
        };

        let target = self.path_for(&entry.id, &version);
        fs::create_dir_all(&target)?;
        write_atomic(&target.join(CHUNKS_FILE), &serde_json::to_vec_pretty(&records)?)?;
        write_atomic(&target.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            source = %entry.id,
            version = %version,
            chunks = manifest.chunk_count,
            path = %target.display(),
            "snapshot frozen"
        );
        Ok(manifest)
    }

    /// Read a snapshot back as chunks ready for re-embedding. Priorities
    /// come from the current registry.
    pub fn restore(&self, source_id: &str, version: &str) -> Result<Vec<Chunk>, SnapshotError> {
        let entry = self
            .registry
            .get(source_id)
            .ok_or_else(|| SnapshotError::UnknownSource(source_id.to_string()))?;
        let dir = self.path_for(source_id, version);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(SnapshotError::NotFound {
                source_id: source_id.to_string(),
                version: version.to_string(),
            });
        }

        let manifest: SnapshotManifest = read_json(&dir.join(MANIFEST_FILE))?;
        if manifest.source_id != source_id || manifest.version != version {
            return Err(invalid(
                &dir,
                format!(
                    "manifest is for {}@{}",
                    manifest.source_id, manifest.version
                ),
            ));
        }

        let records: Vec<SnapshotRecord> = read_json(&dir.join(CHUNKS_FILE))?;
        if records.len() != manifest.chunk_count {
            return Err(invalid(
                &dir,
                format!(
                    "manifest lists {} chunks, file has {}",
                    manifest.chunk_count,
                    records.len()
                ),
            ));
        }

        records
            .into_iter()
            .map(|r| {
                if r.id != chunk_id(&r.document_id, r.chunk_index) {
                    return Err(invalid(&dir, format!("chunk {} has a foreign id", r.id)));
                }
                if r.hash != content_hash(&r.text) {
                    return Err(invalid(&dir, format!("chunk {} fails its hash", r.id)));
                }
                Ok(Chunk {
                    id: r.id,
                    document_id: r.document_id,
                    chunk_index: r.chunk_index,
                    text: r.text,
                    word_count: r.word_count,
                    source_id: entry.id.clone(),
                    priority: entry.priority,
                    hash: r.hash,
                    metadata: r.metadata,
                })
            })
            .collect()
    }

    /// Manifests of every snapshot on disk, sorted by directory name.
    pub fn list(&self) -> Result<Vec<SnapshotManifest>, SnapshotError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();
        dirs.iter()
            .map(|d| read_json(&d.join(MANIFEST_FILE)))
            .collect()
    }
}

fn invalid(path: &Path, reason: String) -> SnapshotError {
    SnapshotError::Invalid {
        path: path.display().to_string(),
        reason,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| invalid(path, e.to_string()))
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::store::test_support::chunk;
    use crate::store::{IndexEntry, MemoryIndex};

    fn registry() -> SourceRegistry {
        let cfg = parse_config(
            r#"
[db]
path = "/tmp/okb.sqlite"

[sources.omarchy]
display_name = "Omarchy Manual"
priority = 1
format = "html"
root = "/tmp/omarchy"
pinned = true
version = "3.2.3"

[sources.arch]
display_name = "Arch Wiki"
priority = 3
format = "html"
root = "/tmp/arch"
"#,
        )
        .unwrap();
        SourceRegistry::from_config(&cfg)
    }

    async fn seeded() -> MemoryIndex {
        let index = MemoryIndex::new();
        for (origin, i, text) in [("hotkeys", 0, "Super Space"), ("hotkeys", 1, "Super Enter"), ("themes", 0, "Tokyo Night")] {
            index
                .upsert(&IndexEntry {
                    chunk: chunk("omarchy", origin, i, text, 1),
                    vector: vec![1.0],
                    model: "hash".into(),
                    run_id: 1,
                })
                .await
                .unwrap();
        }
        index
    }

    #[tokio::test]
    async fn test_freeze_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path(), registry());
        let index = seeded().await;

        let manifest = manager.freeze(&index, "omarchy", false).await.unwrap();
        assert_eq!(manifest.chunk_count, 3);
        assert_eq!(manifest.document_count, 2);
        assert!(manager.exists("omarchy", "3.2.3"));

        let restored = manager.restore("omarchy", "3.2.3").unwrap();
        let original = index.list_source_chunks("omarchy").await.unwrap();
        assert_eq!(restored, original);

        let listed = manager.list().unwrap();
        assert_eq!(listed, vec![manifest]);
    }

    #[tokio::test]
    async fn test_only_pinned_sources_freeze() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path(), registry());
        let index = seeded().await;
        assert!(matches!(
            manager.freeze(&index, "arch", false).await,
            Err(SnapshotError::NotPinned(_))
        ));
        assert!(matches!(
            manager.freeze(&index, "gentoo", false).await,
            Err(SnapshotError::UnknownSource(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_source_and_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path(), registry());
        let index = MemoryIndex::new();
        assert!(matches!(
            manager.freeze(&index, "omarchy", false).await,
            Err(SnapshotError::NothingToFreeze(_))
        ));
        assert!(matches!(
            manager.restore("omarchy", "3.2.3"),
            Err(SnapshotError::NotFound { .. })
        ));
        assert!(manager.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tampered_snapshot_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path(), registry());
        let index = seeded().await;
        manager.freeze(&index, "omarchy", false).await.unwrap();

        let path = manager.path_for("omarchy", "3.2.3").join(CHUNKS_FILE);
        let text = fs::read_to_string(&path).unwrap().replace("Tokyo Night", "Gruvbox");
        fs::write(&path, text).unwrap();
        assert!(matches!(
            manager.restore("omarchy", "3.2.3"),
            Err(SnapshotError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_existing_snapshot_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path(), registry());
        let index = seeded().await;
        manager.freeze(&index, "omarchy", false).await.unwrap();

        let drifted = vec![chunk("omarchy", "hotkeys", 0, "Super Space drifted upstream", 1)];
        assert!(matches!(
            manager.freeze_chunks("omarchy", drifted.clone(), false),
            Err(SnapshotError::AlreadyExists { .. })
        ));
        assert_eq!(manager.restore("omarchy", "3.2.3").unwrap().len(), 3);

        let manifest = manager.freeze_chunks("omarchy", drifted, true).unwrap();
        assert_eq!(manifest.chunk_count, 1);
        let restored = manager.restore("omarchy", "3.2.3").unwrap();
        assert_eq!(restored[0].text, "Super Space drifted upstream");
    }

    #[test]
    fn test_freeze_chunks_ignores_other_sources() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path(), registry());
        let chunks = vec![
            chunk("omarchy", "hotkeys", 0, "Super Space", 1),
            chunk("arch", "Waybar", 0, "Waybar module", 3),
        ];
        let manifest = manager.freeze_chunks("omarchy", chunks, false).unwrap();
        assert_eq!(manifest.chunk_count, 1);
    }
}
